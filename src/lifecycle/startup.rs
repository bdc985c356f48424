//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the registry from declarations and settings
//! - Seed the live map from the static options
//! - Open the override store and run the first pass
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The kill switch still builds the registry and live map, so reads see
//!   file values and defaults, but no engine is created

use std::sync::Arc;
use std::time::Duration;

use crate::config::{disabled_by_env, Settings, StaticOptions, StaticSource};
use crate::registry::{Registry, RegistryError};
use crate::runtime::{Engine, LiveConfig};
use crate::store::{OverrideStore, SqliteStore, StoreError};

/// Everything the HTTP layer needs, built once at startup.
pub struct Services {
    pub live: LiveConfig,
    /// `None` when the engine is disabled.
    pub engine: Option<Arc<Engine>>,
    pub source: StaticSource,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to load declarations: {0}")]
    Registry(#[from] RegistryError),

    #[error("failed to open override store: {0}")]
    Store(#[from] StoreError),
}

/// Initialize services, honouring the `EDITABLE_CONFIG_DISABLED` kill switch.
pub fn initialize(settings: &Settings) -> Result<Services, StartupError> {
    initialize_with(settings, disabled_by_env())
}

pub fn initialize_with(settings: &Settings, disabled: bool) -> Result<Services, StartupError> {
    let registry = Registry::load(&settings.registry.path)?
        .with_validators(&settings.editable.additional_validators)
        .with_policy(&settings.editable.policy());
    tracing::info!(
        declared = registry.iter().count(),
        editable = registry.editable_keys().count(),
        "Registry loaded"
    );

    let options = StaticOptions::from_table(&settings.options);
    let live = LiveConfig::new(
        Arc::new(registry),
        options.iter().map(|(k, v)| (k.clone(), v.clone())),
    );
    let source = StaticSource::new(options);

    if disabled {
        tracing::warn!("Editable config disabled by environment, serving static values only");
        return Ok(Services {
            live,
            engine: None,
            source,
        });
    }

    let store: Arc<dyn OverrideStore> = if settings.store.is_in_memory() {
        Arc::new(SqliteStore::open_in_memory()?)
    } else {
        Arc::new(SqliteStore::open(&settings.store.path)?)
    };

    let engine = Engine::builder(live.clone(), store)
        .source(source.clone())
        .charge_timeout(Duration::from_secs(settings.editable.charge_timeout))
        .build();

    let changes = engine.reconciler().run_now(&[])?;
    tracing::info!(
        changes,
        store = %settings.store.path,
        charge_timeout_secs = settings.editable.charge_timeout,
        "Override engine started"
    );

    Ok(Services {
        live,
        engine: Some(Arc::new(engine)),
        source,
    })
}
