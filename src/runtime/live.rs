//! Live configuration map.
//!
//! The values the running application reads on every request. Entries hold
//! canonical strings; keys without an entry fall back to the registry
//! default. Only the reconciler and static option reloads write here.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::source::StaticOptions;
use crate::registry::Registry;

/// Sent to dependent components after a pass changed something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshEvent {
    /// Increases by one per refresh.
    pub generation: u64,
    /// Number of keys changed by the pass.
    pub changes: usize,
}

#[derive(Clone)]
pub struct LiveConfig {
    values: Arc<DashMap<String, String>>,
    registry: Arc<Registry>,
    generation: Arc<AtomicU64>,
    refresh_tx: broadcast::Sender<RefreshEvent>,
}

impl LiveConfig {
    /// Create the map, seeded with the static options.
    pub fn new(
        registry: Arc<Registry>,
        initial: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let (refresh_tx, _) = broadcast::channel(16);
        Self {
            values: Arc::new(initial.into_iter().collect()),
            registry,
            generation: Arc::new(AtomicU64::new(0)),
            refresh_tx,
        }
    }

    /// Effective value: live entry, else registry default.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_raw(key)
            .or_else(|| self.registry.default_value(key).map(str::to_string))
    }

    /// Live entry only, ignoring defaults.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|r| r.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Effective value converted through the key's validator chain.
    pub fn get_typed(&self, key: &str) -> Result<Option<Value>, String> {
        self.get(key)
            .map(|raw| self.registry.parse(key, &raw))
            .transpose()
    }

    /// Copy of every live entry.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.refresh_tx.subscribe()
    }

    /// Bring file-backed entries in line with reloaded static options.
    ///
    /// Keys in `overridden` keep their live value. Keys dropped from the file
    /// lose their entry and fall back to the default. Returns the number of
    /// entries changed.
    pub fn reload_static(
        &self,
        previous: &StaticOptions,
        next: &StaticOptions,
        overridden: &BTreeSet<String>,
    ) -> usize {
        let keys: BTreeSet<&String> = previous
            .iter()
            .chain(next.iter())
            .map(|(key, _)| key)
            .filter(|key| !overridden.contains(*key))
            .collect();

        let mut changes = 0;
        for key in keys {
            match next.get(key) {
                Some(value) => {
                    if self.set(key, value.to_string()).as_deref() != Some(value) {
                        changes += 1;
                    }
                }
                None => {
                    if self.remove(key).is_some() {
                        changes += 1;
                    }
                }
            }
        }
        changes
    }

    pub(crate) fn set(&self, key: &str, value: String) -> Option<String> {
        self.values.insert(key.to_string(), value)
    }

    pub(crate) fn remove(&self, key: &str) -> Option<String> {
        self.values.remove(key).map(|(_, value)| value)
    }

    pub(crate) fn notify_refresh(&self, changes: usize) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        // No subscribers is fine.
        let _ = self.refresh_tx.send(RefreshEvent {
            generation,
            changes,
        });
        generation
    }
}

impl std::fmt::Debug for LiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConfig")
            .field("entries", &self.values.len())
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DeclaredOption, Validator};
    use serde_json::json;

    fn live() -> LiveConfig {
        let registry = Registry::new([
            DeclaredOption::new("site.title").with_default("Untitled").editable(),
            DeclaredOption::new("app.plugins").with_validators([Validator::AsList]),
        ])
        .unwrap();
        LiveConfig::new(
            Arc::new(registry),
            [("app.plugins".to_string(), "text_view image_view".to_string())],
        )
    }

    #[test]
    fn test_default_fallback() {
        let live = live();
        assert_eq!(live.get("site.title").as_deref(), Some("Untitled"));
        assert_eq!(live.get_raw("site.title"), None);

        live.set("site.title", "My Portal".into());
        assert_eq!(live.get("site.title").as_deref(), Some("My Portal"));

        assert_eq!(live.remove("site.title").as_deref(), Some("My Portal"));
        assert_eq!(live.get("site.title").as_deref(), Some("Untitled"));
    }

    #[test]
    fn test_typed_read() {
        let live = live();
        assert_eq!(
            live.get_typed("app.plugins").unwrap(),
            Some(json!(["text_view", "image_view"]))
        );
        assert_eq!(live.get_typed("missing").unwrap(), None);
    }

    #[test]
    fn test_reload_static_skips_overridden_keys() {
        let live = live();
        live.set("site.title", "Override".into());
        let previous =
            StaticOptions::from_iter([("app.plugins".to_string(), "text_view image_view".to_string())]);
        let next = StaticOptions::from_iter([
            ("site.title".to_string(), "From file".to_string()),
            ("site.about".to_string(), "About".to_string()),
        ]);

        let overridden = BTreeSet::from(["site.title".to_string()]);
        assert_eq!(live.reload_static(&previous, &next, &overridden), 2);
        assert_eq!(live.get("site.title").as_deref(), Some("Override"));
        assert_eq!(live.get("site.about").as_deref(), Some("About"));
        assert!(!live.contains("app.plugins"));

        // Same file again: nothing to do.
        assert_eq!(live.reload_static(&next, &next, &overridden), 0);
    }

    #[tokio::test]
    async fn test_refresh_notification() {
        let live = live();
        let mut rx = live.subscribe();

        assert_eq!(live.notify_refresh(3), 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event, RefreshEvent { generation: 1, changes: 3 });
        assert_eq!(live.generation(), 1);
    }
}
