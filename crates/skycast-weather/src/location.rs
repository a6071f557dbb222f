//! Known locations kept warm by the background refresher.

use std::collections::BTreeSet;

use parking_lot::RwLock;
use skycast_core::is_valid_postal_code;

use crate::error::{WeatherError, WeatherResult};

/// Source of the postal codes the refresher iterates over.
pub trait LocationStore: Send + Sync {
    /// Add a postal code. Returns false if it was already present.
    fn add(&self, postal_code: &str) -> WeatherResult<bool>;

    /// All known postal codes, in ascending order.
    fn list(&self) -> Vec<String>;

    fn has(&self, postal_code: &str) -> bool;

    /// Returns false if the code was not present.
    fn remove(&self, postal_code: &str) -> bool;
}

/// In-process location store
#[derive(Debug, Default)]
pub struct MemoryLocationStore {
    codes: RwLock<BTreeSet<String>>,
}

impl MemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from configuration; invalid entries are skipped with a warning.
    pub fn with_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let store = Self::new();
        for code in codes {
            if let Err(e) = store.add(code.as_ref()) {
                tracing::warn!("Skipping known location: {}", e);
            }
        }
        store
    }
}

impl LocationStore for MemoryLocationStore {
    fn add(&self, postal_code: &str) -> WeatherResult<bool> {
        let code = postal_code.trim();
        if !is_valid_postal_code(code) {
            return Err(WeatherError::invalid_input(format!(
                "{:?} is not a 5-digit postal code",
                postal_code
            )));
        }
        Ok(self.codes.write().insert(code.to_string()))
    }

    fn list(&self) -> Vec<String> {
        self.codes.read().iter().cloned().collect()
    }

    fn has(&self, postal_code: &str) -> bool {
        self.codes.read().contains(postal_code.trim())
    }

    fn remove(&self, postal_code: &str) -> bool {
        self.codes.write().remove(postal_code.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_list_has_remove() {
        let store = MemoryLocationStore::new();
        assert!(store.add("75454").unwrap());
        assert!(store.add(" 10001 ").unwrap());
        assert!(!store.add("75454").unwrap());

        assert_eq!(store.list(), vec!["10001".to_string(), "75454".to_string()]);
        assert!(store.has("10001"));

        assert!(store.remove("10001"));
        assert!(!store.remove("10001"));
        assert!(!store.has("10001"));
    }

    #[test]
    fn test_rejects_malformed_codes() {
        let store = MemoryLocationStore::new();
        assert!(matches!(store.add("abcde"), Err(WeatherError::InvalidInput(_))));
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_seeding_skips_invalid() {
        let store = MemoryLocationStore::with_codes(["75454", "nope", "90210"]);
        assert_eq!(store.list().len(), 2);
    }
}
