use std::collections::VecDeque;
use std::sync::Mutex;

/// Source of new document keys, swappable for deterministic tests.
pub trait IdGenerator: Send + Sync {
    fn new_key(&self) -> String;
}

/// Random 20-character keys in the shape the store assigns itself.
#[derive(Debug, Clone, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn new_key(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()[..20].to_string()
    }
}

/// A deterministic generator that returns a pre-seeded sequence of keys.
///
/// Panics if you request more keys than provided.
#[derive(Debug, Default)]
pub struct FixedIdGenerator {
    keys: Mutex<VecDeque<String>>,
}

impl FixedIdGenerator {
    pub fn new<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        Self {
            keys: Mutex::new(keys.into_iter().map(Into::into).collect()),
        }
    }
}

impl IdGenerator for FixedIdGenerator {
    fn new_key(&self) -> String {
        self.keys
            .lock()
            .expect("fixed id generator lock poisoned")
            .pop_front()
            .expect("fixed id generator exhausted")
    }
}
