//! Rewrites legacy attachment URLs into stable storage paths.
//!
//! Older transactions keep signed download URLs in `adjuntos`. Those expire;
//! the stable form is the object path inside the bucket
//! (`Proyecto/10/2025/01/receipt.jpg`), stored in `adjuntos_paths`.
//! Running the migration twice changes nothing the second time.

use serde::Serialize;

use crate::error::Result;
use crate::fields;
use crate::models::FieldValue;
use crate::schema::{field, transactions_of};
use crate::session::Session;
use crate::store::Document;

const GS_SCHEME: &str = "gs://";
const STORAGE_HOST: &str = "https://storage.googleapis.com/";
const FIREBASE_HOST: &str = "https://firebasestorage.googleapis.com/";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("unrecognized attachment URL")]
    Unrecognized,
    #[error("path is not valid UTF-8 after decoding")]
    Undecodable,
    #[error("path {0:?} is outside the attachment prefix")]
    OutsidePrefix(String),
}

/// Bucket named in a storage URL, when the URL names one.
fn url_bucket(url: &str) -> Option<&str> {
    if let Some(rest) = url.strip_prefix(GS_SCHEME) {
        return rest.split_once('/').map(|(bucket, _)| bucket);
    }
    if let Some(rest) = url.strip_prefix(STORAGE_HOST) {
        return rest.split_once('/').map(|(bucket, _)| bucket);
    }
    url.strip_prefix(FIREBASE_HOST)
        .and_then(|rest| rest.strip_prefix("v0/b/"))
        .and_then(|rest| rest.split_once('/'))
        .map(|(bucket, _)| bucket)
}

/// Object path inside the bucket, still encoded and possibly with a query.
fn raw_object_path(url: &str) -> Option<&str> {
    if let Some(rest) = url.strip_prefix(GS_SCHEME) {
        return rest.split_once('/').map(|(_, path)| path);
    }
    if let Some(rest) = url.strip_prefix(STORAGE_HOST) {
        return rest.split_once('/').map(|(_, path)| path);
    }
    if let Some(rest) = url.strip_prefix(FIREBASE_HOST) {
        return rest
            .strip_prefix("v0/b/")
            .and_then(|rest| rest.split_once("/o/"))
            .map(|(_, path)| path);
    }
    if url.contains("://") {
        return None;
    }
    Some(url)
}

/// Extract the stable storage path from an attachment reference.
///
/// Accepts `gs://` URLs, `storage.googleapis.com` and Firebase download URLs,
/// and bare paths (including ones with a leftover signing query). The query
/// is dropped and the remainder percent-decoded; the result must start with
/// `prefix` and contain no `?`.
pub fn extract_storage_path(url: &str, prefix: &str) -> Result<String, PathError> {
    let raw = raw_object_path(url.trim()).ok_or(PathError::Unrecognized)?;
    let without_query = raw.split('?').next().unwrap_or_default();
    let decoded = urlencoding::decode(without_query).map_err(|_| PathError::Undecodable)?;
    let path = decoded.trim_start_matches('/');

    if path.is_empty() || !path.starts_with(prefix) || path.contains('?') {
        return Err(PathError::OutsidePrefix(path.to_string()));
    }
    Ok(path.to_string())
}

/// Stored paths carrying signing parameters were written by a broken
/// earlier migration and are redone.
pub fn is_corrupt_path(path: &str) -> bool {
    path.contains('?') || path.contains("Expires=")
}

/// Where a record ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Pending,
    Inspected,
    Migrated,
    SkippedAlreadyClean,
    SkippedNoAttachments,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationDetail {
    pub transaction_id: String,
    pub state: MigrationState,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationStats {
    pub dry_run: bool,
    pub total: usize,
    pub with_attachments: usize,
    pub migrated: usize,
    pub skipped_already_clean: usize,
    pub skipped_no_attachments: usize,
    pub failed: usize,
    pub details: Vec<MigrationDetail>,
    /// Details dropped once the cap was reached.
    pub details_omitted: usize,
}

impl MigrationStats {
    fn record(&mut self, state: MigrationState) {
        match state {
            MigrationState::Migrated => self.migrated += 1,
            MigrationState::SkippedAlreadyClean => self.skipped_already_clean += 1,
            MigrationState::SkippedNoAttachments => self.skipped_no_attachments += 1,
            MigrationState::Failed => self.failed += 1,
            MigrationState::Pending | MigrationState::Inspected => {}
        }
    }
}

/// Outcome of inspecting one transaction, before anything is written.
#[derive(Debug, Clone, PartialEq)]
struct Inspection {
    state: MigrationState,
    paths: Vec<String>,
    notes: Vec<String>,
}

fn inspect(doc: &Document, prefix: &str) -> Inspection {
    let items = |name: &str| {
        doc.field(name)
            .map(FieldValue::string_items)
            .unwrap_or_default()
    };
    let existing = items(field::ATTACHMENT_PATHS);
    let mut legacy = items(field::LEGACY_ATTACHMENTS);
    if legacy.is_empty() {
        legacy = items(field::LEGACY_ATTACHMENTS_EN);
    }

    let corrupt = existing.iter().any(|path| is_corrupt_path(path));
    if !existing.is_empty() && !corrupt {
        return Inspection {
            state: MigrationState::SkippedAlreadyClean,
            paths: existing,
            notes: Vec::new(),
        };
    }

    let sources = if legacy.is_empty() { existing } else { legacy };
    if sources.is_empty() {
        return Inspection {
            state: MigrationState::SkippedNoAttachments,
            paths: Vec::new(),
            notes: Vec::new(),
        };
    }

    let mut inspection = Inspection {
        state: MigrationState::Inspected,
        paths: Vec::new(),
        notes: Vec::new(),
    };
    if corrupt {
        inspection
            .notes
            .push("stored paths carry signing parameters, re-migrating".to_string());
    }
    for url in &sources {
        match extract_storage_path(url, prefix) {
            Ok(path) if !inspection.paths.contains(&path) => inspection.paths.push(path),
            Ok(_) => {}
            Err(err) => {
                let shown: String = url.chars().take(80).collect();
                inspection.notes.push(format!("{err}: {shown}"));
            }
        }
    }
    inspection
}

/// Whether any legacy URL on `doc` points at a bucket other than `bucket`.
/// Legacy `appspot.com` names count as the same bucket.
fn names_foreign_bucket(doc: &Document, bucket: &str) -> bool {
    [field::LEGACY_ATTACHMENTS, field::LEGACY_ATTACHMENTS_EN]
        .into_iter()
        .filter_map(|name| doc.field(name))
        .flat_map(FieldValue::string_items)
        .filter_map(|url| url_bucket(&url).map(str::to_string))
        .any(|named| named != bucket && !named.ends_with(".appspot.com"))
}

pub struct AttachmentMigrator<'a> {
    session: &'a Session,
}

impl<'a> AttachmentMigrator<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Migrate every transaction of a project. With `dry_run` nothing is
    /// written and `migrated` counts the records that would change.
    ///
    /// Records are updated one at a time; a failed update is counted and
    /// the run continues.
    pub async fn migrate(&self, project_id: &str, dry_run: bool) -> Result<MigrationStats> {
        let store = self.session.store()?;
        let settings = self.session.settings();
        let docs = store.list(&transactions_of(project_id)).await?;

        tracing::info!(project_id, dry_run, transactions = docs.len(), "Starting attachment migration");

        let mut stats = MigrationStats {
            dry_run,
            total: docs.len(),
            ..MigrationStats::default()
        };
        let push_detail = |stats: &mut MigrationStats, detail: MigrationDetail| {
            if stats.details.len() < settings.max_migration_details {
                stats.details.push(detail);
            } else {
                stats.details_omitted += 1;
            }
        };

        for doc in &docs {
            let Inspection {
                mut state,
                paths,
                notes,
            } = inspect(doc, &settings.attachment_prefix);

            if matches!(
                state,
                MigrationState::SkippedAlreadyClean | MigrationState::SkippedNoAttachments
            ) {
                stats.record(state);
                continue;
            }
            stats.with_attachments += 1;

            for note in notes {
                push_detail(
                    &mut stats,
                    MigrationDetail {
                        transaction_id: doc.id.clone(),
                        state,
                        message: note,
                    },
                );
            }

            if paths.is_empty() {
                state = MigrationState::Failed;
                push_detail(
                    &mut stats,
                    MigrationDetail {
                        transaction_id: doc.id.clone(),
                        state,
                        message: "no valid storage path could be extracted".to_string(),
                    },
                );
                stats.record(state);
                continue;
            }

            if let Some(bucket) = settings.bucket.as_deref() {
                if names_foreign_bucket(doc, bucket) {
                    tracing::debug!(doc = %doc.id, bucket, "Attachment URL names a different bucket");
                }
            }

            let message = if dry_run {
                state = MigrationState::Migrated;
                format!("would write {}", paths.join(", "))
            } else {
                let now = self.session.clock().now();
                match store
                    .update(
                        &doc.path,
                        fields! {
                            field::ATTACHMENT_PATHS => paths.clone(),
                            field::UPDATED_AT => now,
                        },
                    )
                    .await
                {
                    Ok(()) => {
                        state = MigrationState::Migrated;
                        format!("wrote {}", paths.join(", "))
                    }
                    Err(err) => {
                        state = MigrationState::Failed;
                        tracing::warn!(doc = %doc.id, error = %err, "Failed to update attachment paths");
                        format!("update failed: {err}")
                    }
                }
            };
            stats.record(state);
            push_detail(
                &mut stats,
                MigrationDetail {
                    transaction_id: doc.id.clone(),
                    state,
                    message,
                },
            );
        }

        tracing::info!(
            project_id,
            dry_run,
            total = stats.total,
            with_attachments = stats.with_attachments,
            migrated = stats.migrated,
            already_clean = stats.skipped_already_clean,
            no_attachments = stats.skipped_no_attachments,
            failed = stats.failed,
            "Attachment migration finished"
        );
        Ok(stats)
    }
}
