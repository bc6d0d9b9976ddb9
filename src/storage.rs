//! Session persistence of the last saved document.
//!
//! Writes are best effort: a failing store is logged and otherwise ignored.

use crate::diagnostics;
use crate::document::FormDataDocument;
use crate::error::FormError;
use std::collections::HashMap;
use std::fmt;

/// Storage key of the saved form data.
pub const SESSION_KEY: &str = "formeo-formData";

/// String key/value store in the shape of the browser's session storage.
pub trait SessionStorage: fmt::Debug {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), FormError>;
    fn remove(&mut self, key: &str);
}

/// In-process storage with an optional size quota (bytes per value).
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: HashMap::new(),
            quota: Some(quota),
        }
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), FormError> {
        if let Some(quota) = self.quota {
            if value.len() > quota {
                return Err(FormError::Storage(format!(
                    "{} bytes exceeds quota of {}",
                    value.len(),
                    quota
                )));
            }
        }
        self.items.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        self.items.remove(key);
    }
}

/// Previously stored document, if any parses.
pub fn load_snapshot<S: SessionStorage + ?Sized>(storage: &S) -> Option<FormDataDocument> {
    let raw = storage.get(SESSION_KEY)?;
    match FormDataDocument::from_json(&raw) {
        Ok(document) => Some(document),
        Err(e) => {
            diagnostics::warn(format!("ignoring stored form data: {:#}", e));
            None
        }
    }
}

/// Store `document`; failures are reported and swallowed.
pub fn store_snapshot<S: SessionStorage + ?Sized>(storage: &mut S, document: &FormDataDocument) -> bool {
    let stored = document
        .to_json()
        .map_err(|e| FormError::Storage(format!("{:#}", e)))
        .and_then(|json| storage.set(SESSION_KEY, json));
    match stored {
        Ok(()) => true,
        Err(e) => {
            diagnostics::warn(format!("session save failed: {}", e));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn document(id: &str) -> FormDataDocument {
        FormDataDocument {
            id: id.to_string(),
            ..FormDataDocument::default()
        }
    }

    #[test]
    fn snapshot_round_trips() {
        let mut storage = MemoryStorage::new();
        assert!(load_snapshot(&storage).is_none());
        assert!(store_snapshot(&mut storage, &document("d1")));
        assert_eq!(load_snapshot(&storage).map(|d| d.id), Some("d1".to_string()));
    }

    #[test]
    fn quota_failures_are_absorbed() {
        let mut storage = MemoryStorage::with_quota(4);
        assert!(!store_snapshot(&mut storage, &document("d1")));
        assert!(storage.get(SESSION_KEY).is_none());
    }

    #[test]
    fn unreadable_snapshot_is_ignored() {
        let mut storage = MemoryStorage::new();
        storage.set(SESSION_KEY, "not json".into()).unwrap();
        assert!(load_snapshot(&storage).is_none());
    }
}
