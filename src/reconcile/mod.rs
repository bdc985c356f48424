//! Override reconciliation.
//!
//! # Data Flow
//! ```text
//! invocation (before each request, or after an admin action)
//!     → throttle check against last_check / charge_timeout
//!     → apply pending: store.updated_since(last_check) → live map
//!     → reconcile removals: previous active set − current set → restore
//!     → last_check = pass start, active set replaced
//!     → refresh event when anything changed
//! ```
//!
//! # Design Decisions
//! - Rows whose key is no longer editable are never applied
//! - Removals are found by set difference, not by timestamps: a deleted row
//!   leaves no timestamp behind
//! - Removed keys restore the static file value if there is one, otherwise
//!   the live entry is dropped and reads fall back to the registry default
//! - A failing pass does not advance last_check, so the next one retries
//!   everything; writes already made to the live map stay

pub mod state;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::source::StaticSource;
use crate::observability::metrics;
use crate::registry::Registry;
use crate::runtime::{Clock, LiveConfig};
use crate::store::{OverrideStore, StoreError};

pub use state::{Phase, ReconcilerState};

pub struct Reconciler {
    registry: Arc<Registry>,
    store: Arc<dyn OverrideStore>,
    live: LiveConfig,
    source: StaticSource,
    clock: Arc<dyn Clock>,
    charge_timeout: Duration,
    throttle: chrono::Duration,
    state: ReconcilerState,
}

impl Reconciler {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<dyn OverrideStore>,
        live: LiveConfig,
        source: StaticSource,
        clock: Arc<dyn Clock>,
        charge_timeout: Duration,
    ) -> Self {
        let throttle = chrono::Duration::from_std(charge_timeout).unwrap_or_else(|_| {
            tracing::warn!(
                charge_timeout_secs = charge_timeout.as_secs(),
                "Charge timeout out of range, throttled passes will never run again"
            );
            chrono::Duration::MAX
        });
        Self {
            registry,
            store,
            live,
            source,
            clock,
            charge_timeout,
            throttle,
            state: ReconcilerState::new(),
        }
    }

    /// Throttled invocation, used before every request.
    ///
    /// Returns the number of keys changed; `0` without touching the store
    /// when the previous pass is younger than `charge_timeout`.
    pub fn run(&self) -> Result<usize, StoreError> {
        if self.try_throttle() {
            return Ok(0);
        }
        self.run_now(&[])
    }

    /// Check the throttle without any I/O. Returns `true` (and records the
    /// throttled state) when no pass is due.
    pub fn try_throttle(&self) -> bool {
        if self.is_due(self.clock.now()) {
            return false;
        }
        self.state.mark_throttled();
        metrics::record_reconcile("throttled");
        true
    }

    /// Unthrottled pass. `removed_keys` names overrides the caller just
    /// deleted, so they are restored even if this process never saw them
    /// active.
    pub fn run_now(&self, removed_keys: &[String]) -> Result<usize, StoreError> {
        let started_at = self.clock.now();
        match self.pass(removed_keys) {
            Ok(changes) => {
                self.state.finish(started_at);
                metrics::record_reconcile("reconciled");
                if changes > 0 {
                    metrics::record_changes(changes);
                    let generation = self.live.notify_refresh(changes);
                    tracing::info!(changes, generation, "Configuration overrides reconciled");
                }
                Ok(changes)
            }
            Err(e) => {
                metrics::record_reconcile("failed");
                tracing::error!(error = %e, "Configuration reconciliation failed");
                Err(e)
            }
        }
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.state.last_check()
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn active_keys(&self) -> Arc<BTreeSet<String>> {
        self.state.active_keys()
    }

    pub fn charge_timeout(&self) -> Duration {
        self.charge_timeout
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.charge_timeout.is_zero() {
            return true;
        }
        let Some(last_check) = self.state.last_check() else {
            return true;
        };
        now.signed_duration_since(last_check) >= self.throttle
    }

    fn pass(&self, removed_keys: &[String]) -> Result<usize, StoreError> {
        let applied = self.apply_pending(self.state.last_check())?;
        let restored = self.reconcile_removals(removed_keys)?;
        Ok(applied + restored)
    }

    fn apply_pending(&self, since: Option<DateTime<Utc>>) -> Result<usize, StoreError> {
        let mut count = 0;
        for record in self.store.updated_since(since)? {
            if !self.registry.is_editable(&record.key) {
                tracing::debug!(key = %record.key, "Skipping override of non-editable option");
                continue;
            }
            tracing::debug!(
                key = %record.key,
                from = ?self.live.get(&record.key),
                to = %record.value,
                "Applying override"
            );
            self.live.set(&record.key, record.value);
            count += 1;
        }
        Ok(count)
    }

    fn reconcile_removals(&self, removed_keys: &[String]) -> Result<usize, StoreError> {
        let current: BTreeSet<String> = self
            .store
            .keys()?
            .into_iter()
            .filter(|key| self.registry.is_editable(key))
            .collect();
        let previous = self.state.active_keys();

        let stale: BTreeSet<&str> = previous
            .iter()
            .map(String::as_str)
            .chain(removed_keys.iter().map(String::as_str))
            .filter(|key| !current.contains(*key))
            .collect();

        let restored = stale.into_iter().filter(|key| self.restore(key)).count();

        metrics::record_active_overrides(current.len());
        self.state.replace_active_keys(current);
        Ok(restored)
    }

    /// Put `key` back to its file value, or drop the live entry.
    fn restore(&self, key: &str) -> bool {
        if let Some(value) = self.source.get(key) {
            tracing::debug!(key, from = ?self.live.get_raw(key), to = %value, "Resetting option");
            self.live.set(key, value);
            return true;
        }
        match self.live.remove(key) {
            Some(value) => {
                tracing::debug!(key, value = %value, "Removing option");
                true
            }
            None => {
                tracing::debug!(key, "Option has neither a file value nor a live entry");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::source::StaticOptions;
    use crate::registry::{DeclaredOption, EditablePolicy};
    use crate::runtime::ManualClock;
    use crate::store::{MemoryStore, OverrideRecord};
    use chrono::TimeZone;

    struct Fixture {
        store: MemoryStore,
        live: LiveConfig,
        clock: ManualClock,
        reconciler: Reconciler,
    }

    fn registry() -> Registry {
        Registry::new([
            DeclaredOption::new("site.title").with_default("Untitled").editable(),
            DeclaredOption::new("site.about").editable(),
            DeclaredOption::new("site.url"),
        ])
        .unwrap()
    }

    fn fixture_with(registry: Registry, store: MemoryStore, timeout: Duration) -> Fixture {
        let registry = Arc::new(registry);
        let options = StaticOptions::from_iter([("site.title".to_string(), "File Title".to_string())]);
        let live = LiveConfig::new(registry.clone(), options.iter().map(|(k, v)| (k.clone(), v.clone())));
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let reconciler = Reconciler::new(
            registry,
            Arc::new(store.clone()),
            live.clone(),
            StaticSource::new(options),
            Arc::new(clock.clone()),
            timeout,
        );
        Fixture {
            store,
            live,
            clock,
            reconciler,
        }
    }

    fn fixture(timeout: Duration) -> Fixture {
        fixture_with(registry(), MemoryStore::new(), timeout)
    }

    fn put(f: &Fixture, key: &str, value: &str) {
        f.store
            .save(&[OverrideRecord::new(key, value, "", f.clock.now())])
            .unwrap();
    }

    #[test]
    fn test_apply_new_updates() {
        let f = fixture(Duration::ZERO);
        assert_eq!(f.reconciler.phase(), Phase::Idle);

        put(&f, "site.title", "My Portal");
        assert_eq!(f.reconciler.run().unwrap(), 1);
        assert_eq!(f.live.get("site.title").as_deref(), Some("My Portal"));
        assert_eq!(f.reconciler.phase(), Phase::Reconciled);
        assert_eq!(f.reconciler.active_keys().len(), 1);
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let f = fixture(Duration::ZERO);
        put(&f, "site.title", "My Portal");
        assert_eq!(f.reconciler.run().unwrap(), 1);
        assert_eq!(f.reconciler.run().unwrap(), 0);
    }

    #[test]
    fn test_charge_timeout() {
        let f = fixture(Duration::from_secs(10));
        assert_eq!(f.reconciler.run().unwrap(), 0);

        f.clock.advance(Duration::from_secs(5));
        put(&f, "site.title", "Throttled");
        assert_eq!(f.reconciler.run().unwrap(), 0);
        assert_eq!(f.reconciler.phase(), Phase::Throttled);
        assert_eq!(f.live.get("site.title").as_deref(), Some("File Title"));

        f.clock.advance(Duration::from_secs(6));
        assert_eq!(f.reconciler.run().unwrap(), 1);
        assert_eq!(f.live.get("site.title").as_deref(), Some("Throttled"));
    }

    #[test]
    fn test_unrepresentable_timeout_throttles_forever() {
        let f = fixture(Duration::from_secs(u64::MAX));
        assert_eq!(f.reconciler.run().unwrap(), 0);

        f.clock.advance(Duration::from_secs(86_400 * 365 * 100));
        put(&f, "site.about", "About");
        assert_eq!(f.reconciler.run().unwrap(), 0);
        assert_eq!(f.reconciler.phase(), Phase::Throttled);
        assert_eq!(f.reconciler.run_now(&[]).unwrap(), 1);
    }

    #[test]
    fn test_run_now_ignores_throttle() {
        let f = fixture(Duration::from_secs(3600));
        assert_eq!(f.reconciler.run().unwrap(), 0);

        f.clock.advance(Duration::from_secs(1));
        put(&f, "site.about", "About");
        assert!(f.reconciler.try_throttle());
        assert_eq!(f.reconciler.run_now(&[]).unwrap(), 1);
    }

    #[test]
    fn test_old_updates_are_ignored() {
        let f = fixture(Duration::ZERO);
        assert_eq!(f.reconciler.run().unwrap(), 0);

        f.clock.rewind(Duration::from_secs(86_400));
        put(&f, "site.title", "Yesterday");
        f.clock.advance(Duration::from_secs(86_400 + 1));
        assert_eq!(f.reconciler.run().unwrap(), 0);
        assert_eq!(f.live.get("site.title").as_deref(), Some("File Title"));
    }

    #[test]
    fn test_removed_override_restores_file_value() {
        let f = fixture(Duration::ZERO);
        put(&f, "site.title", "My Portal");
        f.reconciler.run().unwrap();

        f.store.delete(&["site.title".to_string()]).unwrap();
        f.clock.advance(Duration::from_secs(1));
        assert_eq!(f.reconciler.run().unwrap(), 1);
        assert_eq!(f.live.get("site.title").as_deref(), Some("File Title"));
        assert!(f.reconciler.active_keys().is_empty());
    }

    #[test]
    fn test_removed_override_falls_back_to_default() {
        let f = fixture(Duration::ZERO);
        put(&f, "site.about", "About us");
        f.reconciler.run().unwrap();
        assert_eq!(f.live.get("site.about").as_deref(), Some("About us"));

        f.store.delete(&["site.about".to_string()]).unwrap();
        f.clock.advance(Duration::from_secs(1));
        assert_eq!(f.reconciler.run().unwrap(), 1);
        assert!(!f.live.contains("site.about"));
        assert_eq!(f.live.get("site.about"), None);
    }

    #[test]
    fn test_removed_keys_hint() {
        let f = fixture(Duration::ZERO);
        put(&f, "site.title", "My Portal");
        // Applied by another process, never seen active here.
        f.live.set("site.title", "My Portal".into());
        f.store.delete(&["site.title".to_string()]).unwrap();

        assert_eq!(f.reconciler.run_now(&["site.title".to_string()]).unwrap(), 1);
        assert_eq!(f.live.get("site.title").as_deref(), Some("File Title"));
    }

    #[test]
    fn test_hint_without_any_value_is_skipped() {
        let f = fixture(Duration::ZERO);
        assert_eq!(f.reconciler.run_now(&["site.about".to_string()]).unwrap(), 0);
    }

    #[test]
    fn test_non_editable_override_is_skipped() {
        let store = MemoryStore::new();
        let first = fixture_with(registry(), store.clone(), Duration::ZERO);
        put(&first, "site.title", "My Portal");

        // Redeployed with the key blacklisted.
        let revoked = registry().with_policy(&EditablePolicy {
            blacklist: vec!["site.title".into()],
            ..Default::default()
        });
        let second = fixture_with(revoked, store, Duration::ZERO);
        assert_eq!(second.reconciler.run().unwrap(), 0);
        assert_eq!(second.live.get("site.title").as_deref(), Some("File Title"));
        assert!(second.reconciler.active_keys().is_empty());
    }

    #[test]
    fn test_refresh_event_only_on_change() {
        let f = fixture(Duration::ZERO);
        let mut rx = f.live.subscribe();

        f.reconciler.run().unwrap();
        assert!(rx.try_recv().is_err());

        f.clock.advance(Duration::from_secs(1));
        put(&f, "site.about", "About");
        f.reconciler.run().unwrap();
        assert_eq!(rx.try_recv().unwrap().changes, 1);
    }

    struct BrokenStore;

    impl OverrideStore for BrokenStore {
        fn get(&self, _: &str) -> Result<Option<OverrideRecord>, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn save(&self, _: &[OverrideRecord]) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
        fn delete(&self, _: &[String]) -> Result<usize, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn updated_since(&self, _: Option<DateTime<Utc>>) -> Result<Vec<OverrideRecord>, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn keys(&self) -> Result<BTreeSet<String>, StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[test]
    fn test_failure_does_not_advance_last_check() {
        let registry = Arc::new(registry());
        let live = LiveConfig::new(registry.clone(), []);
        let reconciler = Reconciler::new(
            registry,
            Arc::new(BrokenStore),
            live,
            StaticSource::default(),
            Arc::new(ManualClock::default()),
            Duration::from_secs(60),
        );

        assert!(reconciler.run().is_err());
        assert!(reconciler.last_check().is_none());
        assert_eq!(reconciler.phase(), Phase::Idle);
        // Not throttled: the next invocation retries.
        assert!(!reconciler.try_throttle());
    }
}
