//! Reconciler state.
//!
//! # States
//! - Idle: no pass has run yet
//! - Throttled: last invocation was skipped, minimum interval not elapsed
//! - Reconciled: last invocation ran a full pass
//!
//! # Design Decisions
//! - No lock: every field is an independent atomic/arc-swap cell
//! - Concurrent passes may both run; the later `finish` wins, which at worst
//!   causes one redundant pass

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle = 0,
    Throttled = 1,
    Reconciled = 2,
}

impl From<u8> for Phase {
    fn from(val: u8) -> Self {
        match val {
            1 => Phase::Throttled,
            2 => Phase::Reconciled,
            _ => Phase::Idle,
        }
    }
}

#[derive(Debug)]
pub struct ReconcilerState {
    last_check: ArcSwapOption<DateTime<Utc>>,
    active_keys: ArcSwap<BTreeSet<String>>,
    phase: AtomicU8,
}

impl ReconcilerState {
    pub fn new() -> Self {
        Self {
            last_check: ArcSwapOption::empty(),
            active_keys: ArcSwap::from_pointee(BTreeSet::new()),
            phase: AtomicU8::new(Phase::Idle as u8),
        }
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.last_check.load().as_deref().copied()
    }

    /// Keys overridden as of the last completed pass.
    pub fn active_keys(&self) -> Arc<BTreeSet<String>> {
        self.active_keys.load_full()
    }

    pub fn phase(&self) -> Phase {
        Phase::from(self.phase.load(Ordering::Relaxed))
    }

    pub(crate) fn mark_throttled(&self) {
        self.phase.store(Phase::Throttled as u8, Ordering::Relaxed);
    }

    pub(crate) fn replace_active_keys(&self, keys: BTreeSet<String>) {
        self.active_keys.store(Arc::new(keys));
    }

    /// Record a completed pass that started at `started_at`.
    pub(crate) fn finish(&self, started_at: DateTime<Utc>) {
        self.last_check.store(Some(Arc::new(started_at)));
        self.phase.store(Phase::Reconciled as u8, Ordering::Relaxed);
    }
}

impl Default for ReconcilerState {
    fn default() -> Self {
        Self::new()
    }
}
