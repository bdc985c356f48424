//! Runtime services shared by request handlers.
//!
//! # Data Flow
//! ```text
//! startup
//!     → Registry (Arc, immutable)
//!     → LiveConfig seeded from static options
//!     → Engine::builder(...).build()
//!         → Reconciler (owns ReconcilerState)
//!     → Arc<Engine> handed to the HTTP layer
//! ```
//!
//! # Design Decisions
//! - One explicitly constructed engine per process, no globals
//! - Clock and store are injected so tests can drive time and storage

pub mod clock;
pub mod live;

use std::sync::Arc;
use std::time::Duration;

pub use clock::{Clock, ManualClock, SystemClock};
pub use live::{LiveConfig, RefreshEvent};

use crate::config::source::StaticSource;
use crate::reconcile::Reconciler;
use crate::registry::Registry;
use crate::store::OverrideStore;

/// The override engine: registry, store, live map and reconciler.
///
/// Admin actions are implemented on this type in `admin::actions`.
pub struct Engine {
    pub(crate) registry: Arc<Registry>,
    pub(crate) store: Arc<dyn OverrideStore>,
    pub(crate) live: LiveConfig,
    pub(crate) source: StaticSource,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) reconciler: Arc<Reconciler>,
}

impl Engine {
    pub fn builder(live: LiveConfig, store: Arc<dyn OverrideStore>) -> EngineBuilder {
        EngineBuilder {
            live,
            store,
            source: StaticSource::default(),
            clock: Arc::new(SystemClock),
            charge_timeout: Duration::ZERO,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn live(&self) -> &LiveConfig {
        &self.live
    }

    pub fn source(&self) -> &StaticSource {
        &self.source
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn store(&self) -> &Arc<dyn OverrideStore> {
        &self.store
    }
}

pub struct EngineBuilder {
    live: LiveConfig,
    store: Arc<dyn OverrideStore>,
    source: StaticSource,
    clock: Arc<dyn Clock>,
    charge_timeout: Duration,
}

impl EngineBuilder {
    /// Static options used when an override is removed.
    pub fn source(mut self, source: StaticSource) -> Self {
        self.source = source;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Minimum interval between throttled passes. Zero disables throttling.
    pub fn charge_timeout(mut self, timeout: Duration) -> Self {
        self.charge_timeout = timeout;
        self
    }

    pub fn build(self) -> Engine {
        let registry = self.live.registry().clone();
        let reconciler = Arc::new(Reconciler::new(
            registry.clone(),
            self.store.clone(),
            self.live.clone(),
            self.source.clone(),
            self.clock.clone(),
            self.charge_timeout,
        ));
        Engine {
            registry,
            store: self.store,
            live: self.live,
            source: self.source,
            clock: self.clock,
            reconciler,
        }
    }
}
