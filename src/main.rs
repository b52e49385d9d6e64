use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use progain::aggregate::{AggregateQuery, DateRange, Dimension, ExpenseGroup};
use progain::app;
use progain::config::{default_config_path, ResolvedConfig};
use progain::models::{BudgetPeriod, BudgetTarget, CatalogKind, Identifier, TransactionType};
use progain::transactions::ListFilter;
use progain::Session;
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn parse_kind_arg(s: &str) -> Result<CatalogKind, String> {
    CatalogKind::parse(s)
        .ok_or_else(|| format!("unknown catalog {s:?} (accounts, categories, subcategories)"))
}

fn parse_dimension_arg(s: &str) -> Result<Dimension, String> {
    Dimension::parse(s)
        .ok_or_else(|| format!("unknown dimension {s:?} (month, account, category, subcategory)"))
}

fn parse_type_arg(s: &str) -> Result<TransactionType, String> {
    TransactionType::parse(s).ok_or_else(|| format!("unknown transaction type {s:?}"))
}

fn parse_id_arg(s: &str) -> Result<Identifier, String> {
    s.parse::<Identifier>().map_err(|e| e.to_string())
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("{s:?}: {e}"))
}

/// `YYYY-MM`
fn parse_month_arg(s: &str) -> Result<DateRange, String> {
    let (year, month) = s
        .split_once('-')
        .ok_or_else(|| format!("month {s:?} must look like 2025-01"))?;
    let year: i32 = year.parse().map_err(|_| format!("invalid year in {s:?}"))?;
    let month: u32 = month.parse().map_err(|_| format!("invalid month in {s:?}"))?;
    DateRange::month(year, month).map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "progain")]
#[command(about = "Project accounting data tools for PROGAIN")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show current configuration
    Config,

    #[command(flatten)]
    Store(StoreCommand),
}

/// Commands that read or write the document store.
#[derive(Subcommand)]
enum StoreCommand {
    /// List projects
    Projects,

    /// List one global catalog
    Catalog {
        #[arg(value_parser = parse_kind_arg)]
        kind: CatalogKind,
    },

    /// Show a project's associations with a catalog
    Links {
        project: String,
        #[arg(value_parser = parse_kind_arg)]
        kind: CatalogKind,

        /// Delete associations whose catalog entry no longer exists
        #[arg(long)]
        prune: bool,
    },

    /// List a project's transactions, newest first
    Transactions {
        project: String,

        #[arg(long, value_parser = parse_id_arg)]
        account: Option<Identifier>,

        #[arg(long)]
        include_deleted: bool,
    },

    /// Totals grouped by month, account, category or subcategory
    Aggregate {
        project: String,

        /// Whole calendar month (YYYY-MM); overrides --from/--to
        #[arg(long, value_parser = parse_month_arg)]
        month: Option<DateRange>,

        #[arg(long, value_parser = parse_date_arg)]
        from: Option<NaiveDate>,

        #[arg(long, value_parser = parse_date_arg)]
        to: Option<NaiveDate>,

        #[arg(long, value_delimiter = ',', default_value = "category", value_parser = parse_dimension_arg)]
        group_by: Vec<Dimension>,

        #[arg(long, value_parser = parse_id_arg)]
        account: Option<Identifier>,

        #[arg(long = "type", value_parser = parse_type_arg)]
        kind: Option<TransactionType>,
    },

    /// Expense records behind one category, subcategory or account total
    Expenses {
        project: String,

        /// Whole calendar month (YYYY-MM); overrides --from/--to
        #[arg(long, value_parser = parse_month_arg)]
        month: Option<DateRange>,

        #[arg(long, value_parser = parse_date_arg)]
        from: Option<NaiveDate>,

        #[arg(long, value_parser = parse_date_arg)]
        to: Option<NaiveDate>,

        #[arg(long, value_parser = parse_id_arg)]
        category: Option<Identifier>,

        #[arg(long, value_parser = parse_id_arg)]
        subcategory: Option<Identifier>,

        #[arg(long, value_parser = parse_id_arg)]
        account: Option<Identifier>,
    },

    /// Budgeted against spent for a period
    Budgets {
        project: String,

        #[arg(long, value_parser = parse_date_arg)]
        from: NaiveDate,

        #[arg(long, value_parser = parse_date_arg)]
        to: NaiveDate,

        /// Report subcategory budgets instead of category budgets
        #[arg(long)]
        subcategories: bool,
    },

    /// Report orphaned associations, orphaned transactions and unpaired transfers
    Audit { project: String },

    /// Rewrite legacy attachment URLs into storage paths
    MigrateAttachments {
        project: String,

        /// Write changes (default is a dry run)
        #[arg(long)]
        apply: bool,
    },

    /// Income, expense and balance per account across all projects
    Balances,

    /// Most recent transactions across all projects
    Recent {
        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long)]
        include_deleted: bool,
    },
}

fn init_logging(config: &ResolvedConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    let json = config.log.json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .json()
        }))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr).with_target(false)))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load progain config: {}", cli.config.display()))?;
    init_logging(&config);

    match cli.command {
        Command::Config => print_json(&app::config_output(&cli.config, &config)),
        Command::Store(command) => {
            let session = Session::connect(&config).context("Failed to open Firestore session")?;
            run(&session, command).await
        }
    }
}

/// `--month`, or `--from`/`--to` with open bounds filled from the project's
/// own expense dates.
async fn resolve_range(
    session: &Session,
    project: &str,
    month: Option<DateRange>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<DateRange> {
    if let Some(range) = month {
        return Ok(range);
    }
    let known = match (from, to) {
        (Some(_), Some(_)) => None,
        _ => app::expense_date_range(session, project).await,
    };
    match (from.or(known.map(|r| r.start)), to.or(known.map(|r| r.end))) {
        (Some(start), Some(end)) => Ok(DateRange::new(start, end)?),
        _ => anyhow::bail!("No date range given and the project has no dated expenses"),
    }
}

async fn run(session: &Session, command: StoreCommand) -> Result<()> {
    match command {
        StoreCommand::Projects => print_json(&app::list_projects(session).await),
        StoreCommand::Catalog { kind } => print_json(&app::list_catalog(session, kind).await),
        StoreCommand::Links {
            project,
            kind,
            prune,
        } => {
            if prune {
                print_json(&app::prune_orphan_links(session, &project, kind).await)
            } else {
                print_json(&app::list_links(session, &project, kind).await)
            }
        }
        StoreCommand::Transactions {
            project,
            account,
            include_deleted,
        } => {
            let filter = ListFilter {
                account,
                include_deleted,
            };
            print_json(&app::list_transactions(session, &project, &filter).await)
        }
        StoreCommand::Aggregate {
            project,
            month,
            from,
            to,
            group_by,
            account,
            kind,
        } => {
            let range = resolve_range(session, &project, month, from, to).await?;
            let mut query = AggregateQuery::new(range).group_by(group_by);
            if let Some(account) = account {
                query = query.account(account);
            }
            if let Some(kind) = kind {
                query = query.kind(kind);
            }
            print_json(&app::aggregate(session, &project, &query).await)
        }
        StoreCommand::Expenses {
            project,
            month,
            from,
            to,
            category,
            subcategory,
            account,
        } => {
            let range = resolve_range(session, &project, month, from, to).await?;
            let group = ExpenseGroup {
                account,
                category,
                subcategory,
            };
            print_json(&app::expense_detail(session, &project, range, &group).await)
        }
        StoreCommand::Budgets {
            project,
            from,
            to,
            subcategories,
        } => {
            let target = if subcategories {
                BudgetTarget::Subcategory
            } else {
                BudgetTarget::Category
            };
            let period = BudgetPeriod::new(from, to);
            print_json(&app::budget_report(session, &project, target, &period).await)
        }
        StoreCommand::Audit { project } => print_json(&app::audit_project(session, &project).await),
        StoreCommand::MigrateAttachments { project, apply } => {
            print_json(&app::migrate_attachments(session, &project, !apply).await)
        }
        StoreCommand::Balances => print_json(&app::account_balances(session).await),
        StoreCommand::Recent {
            limit,
            include_deleted,
        } => print_json(&app::list_recent(session, limit, include_deleted).await),
    }
}
