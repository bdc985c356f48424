//! Startup resolution of the `editable` flag.
//!
//! # Precedence
//! ```text
//! declared flags + extra_editable − blacklist
//!     → ∩ whitelist, when the whitelist is non-empty
//! ```
//!
//! The whitelist only narrows: a listed key without the editable flag stays
//! read-only, and a blacklisted one stays revoked. The result is computed
//! once, before serving, and baked into the registry.

use std::collections::BTreeSet;

use crate::registry::declaration::OptionFlags;
use crate::registry::Registry;

/// The three list switches that control editability.
#[derive(Debug, Clone, Default)]
pub struct EditablePolicy {
    pub whitelist: Vec<String>,
    pub extra_editable: Vec<String>,
    pub blacklist: Vec<String>,
}

impl EditablePolicy {
    /// Compute the set of editable keys for `registry`.
    ///
    /// Undeclared keys named in any list are reported and ignored.
    pub fn resolve(&self, registry: &Registry) -> BTreeSet<String> {
        let known = |list: &'static str, key: &String| {
            if registry.contains(key) {
                true
            } else {
                tracing::warn!(key = %key, list, "Option is not declared, ignoring");
                false
            }
        };

        let mut editable: BTreeSet<String> = registry
            .iter()
            .filter(|option| option.has_flag(OptionFlags::EDITABLE))
            .map(|option| option.key().to_string())
            .collect();

        for key in self.extra_editable.iter().filter(|key| known("extra_editable", *key)) {
            editable.insert(key.clone());
        }
        for key in self.blacklist.iter().filter(|key| known("blacklist", *key)) {
            editable.remove(key);
        }

        if !self.whitelist.is_empty() {
            let allowed: BTreeSet<&String> = self
                .whitelist
                .iter()
                .filter(|key| known("whitelist", *key))
                .collect();
            editable.retain(|key| allowed.contains(key));
        }

        editable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DeclaredOption;

    fn registry() -> Registry {
        Registry::new([
            DeclaredOption::new("site.title").editable(),
            DeclaredOption::new("site.description").editable(),
            DeclaredOption::new("site.url"),
            DeclaredOption::new("search.rows"),
        ])
        .unwrap()
    }

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_declared_flags_by_default() {
        let resolved = EditablePolicy::default().resolve(&registry());
        assert_eq!(resolved, BTreeSet::from(["site.description".into(), "site.title".into()]));
    }

    #[test]
    fn test_extra_and_blacklist() {
        let policy = EditablePolicy {
            extra_editable: keys(&["search.rows", "no.such.key"]),
            blacklist: keys(&["site.title"]),
            ..Default::default()
        };
        let resolved = policy.resolve(&registry());
        assert_eq!(
            resolved,
            BTreeSet::from(["search.rows".into(), "site.description".into()])
        );
    }

    #[test]
    fn test_whitelist_only_narrows() {
        let policy = EditablePolicy {
            whitelist: keys(&["site.title", "site.url", "search.rows", "unknown.key"]),
            extra_editable: keys(&["search.rows"]),
            blacklist: keys(&["site.title"]),
        };
        let resolved = policy.resolve(&registry());
        // site.url is not flagged and site.title is blacklisted.
        assert_eq!(resolved, BTreeSet::from(["search.rows".into()]));
    }

    #[test]
    fn test_whitelist_drops_unlisted() {
        let policy = EditablePolicy {
            whitelist: keys(&["site.description"]),
            ..Default::default()
        };
        let resolved = policy.resolve(&registry());
        assert_eq!(resolved, BTreeSet::from(["site.description".into()]));
    }
}
