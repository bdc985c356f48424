//! Static application options (the `[options]` table of the settings file).
//!
//! Nested tables are flattened into dotted keys, so these two are the same:
//! ```toml
//! [options]
//! "site.title" = "Portal"
//!
//! [options.site]
//! title = "Portal"
//! ```
//! Values are kept as their literal string form; lists are space separated.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::registry::declaration::toml_to_json;
use crate::registry::validators::render;

/// Flattened `key → literal value` view of the static options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticOptions(BTreeMap<String, String>);

impl StaticOptions {
    pub fn from_table(table: &toml::Table) -> Self {
        let mut flat = BTreeMap::new();
        flatten_into(&mut flat, None, table);
        Self(flat)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl FromIterator<(String, String)> for StaticOptions {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn flatten_into(out: &mut BTreeMap<String, String>, prefix: Option<&str>, table: &toml::Table) {
    for (name, value) in table {
        let key = match prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.clone(),
        };
        match value {
            toml::Value::Table(nested) => flatten_into(out, Some(&key), nested),
            other => {
                out.insert(key, render(&toml_to_json(other.clone())));
            }
        }
    }
}

/// Shared, swappable handle to the static options.
///
/// Consulted by the reconciler when an override disappears and the key has
/// to fall back to its file value. The settings watcher swaps in a fresh
/// parse when the file changes on disk.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    current: Arc<ArcSwap<StaticOptions>>,
}

impl StaticSource {
    pub fn new(options: StaticOptions) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(options)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.current.load().get(key).map(str::to_string)
    }

    pub fn snapshot(&self) -> Arc<StaticOptions> {
        self.current.load_full()
    }

    pub fn replace(&self, options: StaticOptions) {
        self.current.store(Arc::new(options));
    }
}
