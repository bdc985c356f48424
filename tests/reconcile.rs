//! Two engines sharing one SQLite file, as two worker processes would.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use editable_config::config::{StaticOptions, StaticSource};
use editable_config::registry::Registry;
use editable_config::runtime::{Engine, LiveConfig, ManualClock};
use editable_config::store::SqliteStore;
use serde_json::json;

mod common;

fn engine(path: &std::path::Path, clock: &ManualClock, timeout: Duration) -> Engine {
    let registry = Arc::new(Registry::from_toml_str(common::DECLARATIONS).unwrap());
    let options = StaticOptions::from_iter([(
        "site.description".to_string(),
        "From file".to_string(),
    )]);
    let live = LiveConfig::new(
        registry,
        options.iter().map(|(k, v)| (k.clone(), v.clone())),
    );
    Engine::builder(live, Arc::new(SqliteStore::open(path).unwrap()))
        .source(StaticSource::new(options))
        .clock(Arc::new(clock.clone()))
        .charge_timeout(timeout)
        .build()
}

fn tick(clock: &ManualClock) {
    clock.advance(Duration::from_millis(5));
}

#[test]
fn test_changes_propagate_between_engines() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("overrides.db");
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap());

    let admin = engine(&db, &clock, Duration::ZERO);
    let worker = engine(&db, &clock, Duration::ZERO);
    worker.reconciler().run().unwrap();
    tick(&clock);

    let options = [("site.title".to_string(), json!("My Portal"))].into();
    admin.change(&options, true).unwrap();
    tick(&clock);

    assert_eq!(worker.live().get("site.title").as_deref(), Some("Untitled"));
    assert_eq!(worker.reconciler().run().unwrap(), 1);
    assert_eq!(worker.live().get("site.title").as_deref(), Some("My Portal"));

    // Idempotent: nothing new, nothing to do.
    tick(&clock);
    assert_eq!(worker.reconciler().run().unwrap(), 0);
    tick(&clock);

    admin.revert(&["site.title".to_string()], true).unwrap();
    tick(&clock);
    assert_eq!(worker.reconciler().run().unwrap(), 1);
    assert_eq!(worker.live().get("site.title").as_deref(), Some("Untitled"));
    tick(&clock);

    // The worker never hears about the reset; set difference finds it.
    admin.reset(&["site.title".to_string()], true).unwrap();
    tick(&clock);
    assert_eq!(worker.reconciler().run().unwrap(), 1);
    assert!(!worker.live().contains("site.title"));
    assert_eq!(worker.live().get("site.title").as_deref(), Some("Untitled"));
}

#[test]
fn test_removed_override_falls_back_to_file_value() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("overrides.db");
    let clock = ManualClock::default();

    let admin = engine(&db, &clock, Duration::ZERO);
    let worker = engine(&db, &clock, Duration::ZERO);

    let options = [("site.description".to_string(), json!("Edited"))].into();
    admin.change(&options, false).unwrap();
    tick(&clock);
    worker.reconciler().run().unwrap();
    assert_eq!(worker.live().get("site.description").as_deref(), Some("Edited"));

    admin.reset(&["site.description".to_string()], false).unwrap();
    tick(&clock);
    worker.reconciler().run().unwrap();
    assert_eq!(worker.live().get("site.description").as_deref(), Some("From file"));
}

#[test]
fn test_worker_throttle() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("overrides.db");
    let clock = ManualClock::default();

    let admin = engine(&db, &clock, Duration::ZERO);
    let worker = engine(&db, &clock, Duration::from_secs(10));
    worker.reconciler().run().unwrap();
    tick(&clock);

    let options = [("search.rows".to_string(), json!(50))].into();
    admin.change(&options, true).unwrap();

    clock.advance(Duration::from_secs(5));
    assert_eq!(worker.reconciler().run().unwrap(), 0);
    assert_eq!(worker.live().get("search.rows").as_deref(), Some("20"));

    clock.advance(Duration::from_secs(5));
    assert_eq!(worker.reconciler().run().unwrap(), 1);
    assert_eq!(worker.live().get("search.rows").as_deref(), Some("50"));
}
