use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, serialize_duration};
use crate::store::DEFAULT_BATCH_LIMIT;

pub const CONFIG_FILE_NAME: &str = "progain.toml";
pub const DEFAULT_BUCKET: &str = "progain-25fdf.firebasestorage.app";
pub const DEFAULT_ATTACHMENT_PREFIX: &str = "Proyecto/";
pub const DEFAULT_TOKEN_ENV: &str = "PROGAIN_ACCESS_TOKEN";

fn default_project_id() -> String {
    "progain-25fdf".to_string()
}

fn default_database() -> String {
    "(default)".to_string()
}

fn default_api_base() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Document store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub project_id: String,
    pub database: String,
    /// Firestore REST endpoint; point at the emulator for local runs.
    pub base_url: String,
    /// Operations per atomic batch.
    pub batch_limit: usize,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
            database: default_database(),
            base_url: default_api_base(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            request_timeout: default_request_timeout(),
        }
    }
}

/// Where the access token comes from. The environment variable wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub token_env: String,
    /// If relative, resolved from the config file location.
    pub token_file: Option<PathBuf>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            token_file: None,
        }
    }
}

/// Object storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    /// Replacement for empty or legacy `appspot.com` bucket names.
    pub default_bucket: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentsConfig {
    /// Prefix every stable storage path starts with.
    pub path_prefix: String,
    /// Cap on per-record lines kept in a migration report.
    pub max_details: usize,
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            path_prefix: DEFAULT_ATTACHMENT_PREFIX.to_string(),
            max_details: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Contents of `progain.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub credentials: CredentialsConfig,
    pub storage: StorageConfig,
    pub attachments: AttachmentsConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Empty and legacy `*.appspot.com` bucket names are replaced.
pub fn normalize_bucket(bucket: Option<&str>, default_bucket: &str) -> String {
    match bucket.map(str::trim) {
        Some(name) if !name.is_empty() && !name.contains("appspot.com") => name.to_string(),
        other => {
            tracing::warn!(
                bucket = other.unwrap_or_default(),
                replacement = default_bucket,
                "Replacing storage bucket name"
            );
            default_bucket.to_string()
        }
    }
}

/// Loaded configuration with resolved paths and bucket.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config_path: PathBuf,
    pub store: StoreConfig,
    pub token_env: String,
    pub token_file: Option<PathBuf>,
    pub bucket: String,
    pub attachments: AttachmentsConfig,
    pub log: LogConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./progain.toml` if it exists in current directory
/// 2. `<config dir>/progain/progain.toml`
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from(CONFIG_FILE_NAME);
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("progain").join(CONFIG_FILE_NAME);
    }

    local_config
}

impl ResolvedConfig {
    fn from_config(config: Config, config_path: PathBuf, config_dir: &Path) -> Self {
        let token_file = config.credentials.token_file.map(|file| {
            if file.is_absolute() {
                file
            } else {
                config_dir.join(file)
            }
        });
        let default_bucket = config
            .storage
            .default_bucket
            .as_deref()
            .unwrap_or(DEFAULT_BUCKET);
        let bucket = normalize_bucket(config.storage.bucket.as_deref(), default_bucket);

        Self {
            config_path,
            store: config.store,
            token_env: config.credentials.token_env,
            token_file,
            bucket,
            attachments: config.attachments,
            log: config.log,
        }
    }

    /// Load and resolve config from a file path.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;
        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?
            .to_path_buf();

        let config = Config::load(&config_path)?;
        Ok(Self::from_config(config, config_path, &config_dir))
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?
            .to_path_buf();

        Ok(Self::from_config(Config::default(), config_path, &config_dir))
    }

    /// Access token from the configured environment variable, else the token
    /// file. `None` when neither is set (e.g. against the emulator).
    pub fn access_token(&self) -> Result<Option<SecretString>> {
        if let Ok(value) = std::env::var(&self.token_env) {
            if !value.trim().is_empty() {
                return Ok(Some(SecretString::new(value.trim().to_string().into())));
            }
        }

        match &self.token_file {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read token file: {}", path.display()))?;
                let token = content.trim();
                if token.is_empty() {
                    anyhow::bail!("Token file is empty: {}", path.display());
                }
                Ok(Some(SecretString::new(token.to_string().into())))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store.database, "(default)");
        assert_eq!(config.store.batch_limit, 400);
        assert_eq!(config.store.request_timeout, Duration::from_secs(30));
        assert_eq!(config.attachments.path_prefix, "Proyecto/");
        assert_eq!(config.attachments.max_details, 200);
    }

    #[test]
    fn test_load_sections() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[store]")?;
        writeln!(file, "project_id = \"demo\"")?;
        writeln!(file, "batch_limit = 50")?;
        writeln!(file, "request_timeout = \"5s\"")?;
        writeln!(file, "[attachments]")?;
        writeln!(file, "max_details = 10")?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.store.project_id, "demo");
        assert_eq!(config.store.batch_limit, 50);
        assert_eq!(config.store.request_timeout, Duration::from_secs(5));
        assert_eq!(config.store.database, "(default)");
        assert_eq!(config.attachments.max_details, 10);
        assert_eq!(config.attachments.path_prefix, "Proyecto/");

        Ok(())
    }

    #[test]
    fn test_bad_timeout_is_rejected() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[store]\nrequest_timeout = \"soon\"\n")?;

        assert!(Config::load(&config_path).is_err());
        Ok(())
    }

    #[test]
    fn test_bucket_normalization() {
        assert_eq!(normalize_bucket(None, DEFAULT_BUCKET), DEFAULT_BUCKET);
        assert_eq!(normalize_bucket(Some("  "), DEFAULT_BUCKET), DEFAULT_BUCKET);
        assert_eq!(
            normalize_bucket(Some("progain-25fdf.appspot.com"), DEFAULT_BUCKET),
            DEFAULT_BUCKET
        );
        assert_eq!(
            normalize_bucket(Some("custom.firebasestorage.app"), DEFAULT_BUCKET),
            "custom.firebasestorage.app"
        );
    }

    #[test]
    fn test_resolved_config_resolves_token_file_and_bucket() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &config_path,
            "[credentials]\ntoken_env = \"PROGAIN_TEST_TOKEN_UNSET\"\ntoken_file = \"token.txt\"\n\
             [storage]\nbucket = \"old.appspot.com\"\n",
        )?;
        std::fs::write(dir.path().join("token.txt"), "  secret-token\n")?;

        let resolved = ResolvedConfig::load(&config_path)?;
        assert_eq!(resolved.bucket, DEFAULT_BUCKET);
        assert_eq!(
            resolved.token_file.as_deref(),
            Some(dir.path().canonicalize()?.join("token.txt").as_path())
        );
        let token = resolved.access_token()?.expect("token from file");
        assert_eq!(token.expose_secret(), "secret-token");

        Ok(())
    }

    #[test]
    fn test_resolved_config_load_or_default_missing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let resolved = ResolvedConfig::load_or_default(&config_path)?;
        assert_eq!(resolved.config_path, config_path);
        assert_eq!(resolved.store.project_id, "progain-25fdf");
        assert_eq!(resolved.bucket, DEFAULT_BUCKET);
        assert!(resolved.token_file.is_none());

        Ok(())
    }
}
