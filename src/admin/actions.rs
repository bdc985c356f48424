//! Change-request handlers.
//!
//! Every mutation validates all of its input before writing anything. With
//! `apply = true` a reconciliation pass runs before returning; the returned
//! records always reflect the store right after the mutation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::admin::pattern::glob_match;
use crate::admin::payload::{ListedOption, OptionMap, Records, UpdateRequest, UpdateResult};
use crate::observability::metrics;
use crate::registry::FieldErrors;
use crate::runtime::Engine;
use crate::store::{OverrideRecord, StoreError};

const NOT_EDITABLE: &str = "Not editable";

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// Field-level problems keyed by configuration key.
    #[error("validation failed for {}", .0.keys().cloned().collect::<Vec<_>>().join(", "))]
    Validation(FieldErrors),

    #[error("no override for {0}")]
    NotFound(String),

    #[error("editable config is disabled")]
    Disabled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Engine {
    /// Editable keys matching `pattern`, with their live value and override.
    pub fn list(&self, pattern: &str) -> Result<BTreeMap<String, ListedOption>, ActionError> {
        let mut overrides: Records = self
            .store
            .updated_since(None)?
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect();

        Ok(self
            .registry
            .editable_keys()
            .filter(|key| glob_match(pattern, key))
            .map(|key| {
                let listed = ListedOption {
                    value: self.current_value(key),
                    option: overrides.remove(key),
                };
                (key.to_string(), listed)
            })
            .collect())
    }

    /// Create or update overrides for every key in `options`.
    pub fn change(&self, options: &OptionMap, apply: bool) -> Result<Records, ActionError> {
        let records = self.prepare(options)?;
        self.store.save(&records)?;
        metrics::record_mutation("change", records.len());

        if apply {
            self.reconciler.run_now(&[])?;
        }
        Ok(into_records(records))
    }

    /// Single-key variant of [`Engine::change`] that may pin `prev_value`.
    pub fn create(
        &self,
        key: &str,
        value: &Value,
        prev_value: Option<String>,
        apply: bool,
    ) -> Result<OverrideRecord, ActionError> {
        let options = OptionMap::from([(key.to_string(), value.clone())]);
        let mut records = self.prepare(&options)?;
        if let Some(prev_value) = prev_value {
            for record in &mut records {
                record.prev_value = prev_value.clone();
            }
        }
        self.store.save(&records)?;
        metrics::record_mutation("create", records.len());

        if apply {
            self.reconciler.run_now(&[])?;
        }
        records
            .pop()
            .ok_or_else(|| ActionError::Internal(format!("no record prepared for {}", key)))
    }

    /// Swap current and previous values of existing overrides.
    pub fn revert(&self, keys: &[String], apply: bool) -> Result<Records, ActionError> {
        let mut records = self.existing(keys)?;
        for record in &records {
            self.check_revert(record)?;
        }

        let now = self.clock.now();
        for record in &mut records {
            record.revert(now);
        }
        self.store.save(&records)?;
        metrics::record_mutation("revert", records.len());

        if apply {
            self.reconciler.run_now(&[])?;
        }
        Ok(into_records(records))
    }

    /// Delete overrides. The returned records are the deleted rows.
    pub fn reset(&self, keys: &[String], apply: bool) -> Result<Records, ActionError> {
        let records = self.existing(keys)?;
        let removed: Vec<String> = records.iter().map(|record| record.key.clone()).collect();
        self.store.delete(&removed)?;
        metrics::record_mutation("reset", removed.len());

        if apply {
            self.reconciler.run_now(&removed)?;
        }
        Ok(into_records(records))
    }

    /// `change`, then `revert`, then `reset` in one write, reconciled once
    /// at the end.
    ///
    /// Later groups see the records prepared by earlier ones. Any error in
    /// any group rejects the whole request before the store is touched.
    pub fn update(&self, request: &UpdateRequest) -> Result<UpdateResult, ActionError> {
        let change = into_records(self.prepare(&request.change)?);
        let mut pending = change.clone();

        let now = self.clock.now();
        let mut revert = Records::new();
        for key in &request.revert {
            let mut record = match pending.get(key) {
                Some(record) => record.clone(),
                None => self.find(key)?,
            };
            self.check_revert(&record)?;
            record.revert(now);
            pending.insert(key.clone(), record.clone());
            revert.insert(key.clone(), record);
        }

        let mut reset = Records::new();
        for key in &request.reset {
            let record = match pending.remove(key) {
                Some(record) => record,
                None => self.find(key)?,
            };
            reset.insert(key.clone(), record);
        }

        let records: Vec<OverrideRecord> = pending.into_values().collect();
        let removed: Vec<String> = reset.keys().cloned().collect();
        self.store.commit(&records, &removed)?;
        metrics::record_mutation("update", records.len() + removed.len());

        if request.apply {
            self.reconciler.run_now(&removed)?;
        }
        Ok(UpdateResult {
            change,
            revert,
            reset,
        })
    }

    /// Force a reconciliation pass.
    pub fn apply(&self, removed_keys: &[String]) -> Result<usize, ActionError> {
        Ok(self.reconciler.run_now(removed_keys)?)
    }

    /// Start time of the most recent completed pass.
    pub fn last_check(&self) -> Result<DateTime<Utc>, ActionError> {
        self.reconciler.last_check().ok_or(ActionError::Disabled)
    }

    /// Whether the store holds changes newer than the last pass.
    pub fn has_pending(&self) -> Result<bool, ActionError> {
        Ok(self.store.is_updated_since(self.reconciler.last_check())?)
    }

    /// Canonical form of the effective value of `key`.
    fn current_value(&self, key: &str) -> String {
        self.live
            .get(key)
            .map(|raw| self.registry.canonicalize(key, &Value::String(raw)))
            .unwrap_or_default()
    }

    fn prepare(&self, options: &OptionMap) -> Result<Vec<OverrideRecord>, ActionError> {
        let mut errors = FieldErrors::new();
        let mut canonical = BTreeMap::new();
        for (key, raw) in options {
            if !self.registry.is_editable(key) {
                errors
                    .entry(key.clone())
                    .or_default()
                    .push(NOT_EDITABLE.to_string());
                continue;
            }
            canonical.insert(key.clone(), self.registry.canonicalize(key, raw));
        }

        errors.extend(
            self.registry
                .validate(canonical.keys().map(String::as_str), |key| {
                    canonical.get(key).cloned().or_else(|| self.live.get(key))
                }),
        );
        if !errors.is_empty() {
            return Err(ActionError::Validation(errors));
        }

        let now = self.clock.now();
        canonical
            .into_iter()
            .map(|(key, value)| {
                let prev_value = self.current_value(&key);
                let record = match self.store.get(&key)? {
                    Some(mut record) => {
                        record.value = value;
                        record.prev_value = prev_value;
                        record.touch(now);
                        record
                    }
                    None => OverrideRecord::new(key, value, prev_value, now),
                };
                Ok(record)
            })
            .collect()
    }

    fn find(&self, key: &str) -> Result<OverrideRecord, ActionError> {
        self.store
            .get(key)?
            .ok_or_else(|| ActionError::NotFound(key.to_string()))
    }

    fn existing(&self, keys: &[String]) -> Result<Vec<OverrideRecord>, ActionError> {
        keys.iter().map(|key| self.find(key)).collect()
    }

    /// The value a revert would restore must pass the key's validators.
    fn check_revert(&self, record: &OverrideRecord) -> Result<(), ActionError> {
        let errors = self
            .registry
            .validate([record.key.as_str()], |_| Some(record.prev_value.clone()));
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ActionError::Validation(errors))
        }
    }
}

fn into_records(records: Vec<OverrideRecord>) -> Records {
    records
        .into_iter()
        .map(|record| (record.key.clone(), record))
        .collect()
}
