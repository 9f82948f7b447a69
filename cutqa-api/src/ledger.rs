use std::collections::HashSet;
use std::sync::Mutex;

/// Files already handed to the scanner during this process lifetime.
///
/// Claiming is a single check-and-insert under one lock, so two concurrent
/// passes can never both report the same file.
#[derive(Debug, Default)]
pub struct ProcessedLedger {
    seen: Mutex<HashSet<String>>,
}

impl ProcessedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as processed. Returns false if it was already claimed.
    pub fn claim(&self, key: &str) -> bool {
        self.lock().insert(key.to_string())
    }

    /// Forgets a claim so a later pass can pick the file up again.
    pub fn release(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked mid-insert.
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
