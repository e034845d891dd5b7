use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Ledger {
    live: HashSet<String>,
    issued: u64,
    released: u64,
}

/// Issues preview references and counts how many are still held.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    ledger: Arc<Mutex<Ledger>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, name: &str) -> PreviewUri {
        let uri = format!("blob:midfit/{}", Uuid::new_v4());
        let mut ledger = self.lock();
        ledger.live.insert(uri.clone());
        ledger.issued += 1;
        debug!(uri = %uri, file = name, "preview issued");
        PreviewUri {
            uri,
            registry: self.clone(),
        }
    }

    pub fn live(&self) -> usize {
        self.lock().live.len()
    }

    pub fn issued(&self) -> u64 {
        self.lock().issued
    }

    pub fn released(&self) -> u64 {
        self.lock().released
    }

    pub fn is_live(&self, uri: &str) -> bool {
        self.lock().live.contains(uri)
    }

    fn release(&self, uri: &str) {
        let mut ledger = self.lock();
        if ledger.live.remove(uri) {
            ledger.released += 1;
            debug!(uri, "preview released");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live preview reference. Released exactly once, when dropped.
pub struct PreviewUri {
    uri: String,
    registry: PreviewRegistry,
}

impl PreviewUri {
    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

impl fmt::Debug for PreviewUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PreviewUri").field(&self.uri).finish()
    }
}

impl Drop for PreviewUri {
    fn drop(&mut self) {
        self.registry.release(&self.uri);
    }
}
