use std::sync::{Arc, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::config::{ResolvedConfig, DEFAULT_ATTACHMENT_PREFIX};
use crate::error::{Error, Result};
use crate::store::DocumentStore;

/// Per-session settings that components read instead of globals.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub attachment_prefix: String,
    pub max_migration_details: usize,
    pub bucket: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            attachment_prefix: DEFAULT_ATTACHMENT_PREFIX.to_string(),
            max_migration_details: 200,
            bucket: None,
        }
    }
}

impl From<&ResolvedConfig> for SessionSettings {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            attachment_prefix: config.attachments.path_prefix.clone(),
            max_migration_details: config.attachments.max_details,
            bucket: Some(config.bucket.clone()),
        }
    }
}

/// An open (or closed) connection to the document store.
///
/// Every component borrows a session; nothing reaches the store through a
/// global. Once closed, every operation fails with [`Error::NotInitialized`].
pub struct Session {
    store: RwLock<Option<Arc<dyn DocumentStore>>>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl Session {
    pub fn open(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store: RwLock::new(Some(store)),
            clock: Arc::new(SystemClock),
            settings: SessionSettings::default(),
        }
    }

    /// A session with no store attached.
    pub fn closed() -> Self {
        Self {
            store: RwLock::new(None),
            clock: Arc::new(SystemClock),
            settings: SessionSettings::default(),
        }
    }

    /// Connect to Firestore using the resolved configuration.
    #[cfg(feature = "firestore")]
    pub fn connect(config: &ResolvedConfig) -> anyhow::Result<Self> {
        let store = crate::store::FirestoreStore::new(
            &config.store.project_id,
            &config.store.database,
            config.access_token()?,
            config.store.request_timeout,
        )?
        .with_base_url(&config.store.base_url)
        .with_batch_limit(config.store.batch_limit);

        tracing::info!(
            project = %config.store.project_id,
            database = %config.store.database,
            bucket = %config.bucket,
            "Opened Firestore session"
        );
        Ok(Self::open(Arc::new(store)).with_settings(SessionSettings::from(config)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Attach a store, replacing any current one.
    pub fn reopen(&self, store: Arc<dyn DocumentStore>) {
        *self.store.write().expect("session lock poisoned") = Some(store);
    }

    pub fn close(&self) {
        let was_open = self
            .store
            .write()
            .expect("session lock poisoned")
            .take()
            .is_some();
        if was_open {
            tracing::info!("Session closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.store.read().expect("session lock poisoned").is_some()
    }

    /// The attached store, or [`Error::NotInitialized`].
    pub fn store(&self) -> Result<Arc<dyn DocumentStore>> {
        self.store
            .read()
            .expect("session lock poisoned")
            .clone()
            .ok_or(Error::NotInitialized)
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }
}
