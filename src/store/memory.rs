//! In-process override store.
//!
//! Nothing survives a restart. Handy for embedding and tests.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::store::{OverrideRecord, OverrideStore, StoreError};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, OverrideRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl OverrideStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<OverrideRecord>, StoreError> {
        Ok(self.inner.get(key).map(|r| r.value().clone()))
    }

    fn save(&self, records: &[OverrideRecord]) -> Result<(), StoreError> {
        for record in records {
            self.inner.insert(record.key.clone(), record.clone());
        }
        Ok(())
    }

    fn delete(&self, keys: &[String]) -> Result<usize, StoreError> {
        Ok(keys
            .iter()
            .filter(|key| self.inner.remove(key.as_str()).is_some())
            .count())
    }

    fn updated_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<OverrideRecord>, StoreError> {
        Ok(self
            .inner
            .iter()
            .filter(|r| since.map_or(true, |since| r.value().updated_at > since))
            .map(|r| r.value().clone())
            .collect())
    }

    fn keys(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.inner.iter().map(|r| r.key().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_memory_store_operations() {
        let store = MemoryStore::new();
        let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap();

        store
            .save(&[
                OverrideRecord::new("a", "1", "", t0),
                OverrideRecord::new("b", "2", "", t1),
            ])
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.updated_since(Some(t0)).unwrap().len(), 1);
        assert!(store.is_updated_since(None).unwrap());
        assert!(!store.is_updated_since(Some(t1)).unwrap());

        assert_eq!(store.delete(&["a".into(), "a".into()]).unwrap(), 1);
        assert_eq!(store.get("b").unwrap().unwrap().value, "2");
        assert!(store.get("a").unwrap().is_none());
    }
}
