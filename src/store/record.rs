//! Override record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A customized configuration key.
///
/// Both values are canonical strings. `prev_value` holds the live value that
/// was active right before the override was created or last changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub key: String,
    pub value: String,
    pub prev_value: String,
    pub updated_at: DateTime<Utc>,
}

impl OverrideRecord {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        prev_value: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            prev_value: prev_value.into(),
            updated_at: now,
        }
    }

    /// Bump the modification time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Swap current and previous values.
    pub fn revert(&mut self, now: DateTime<Utc>) {
        std::mem::swap(&mut self.value, &mut self.prev_value);
        self.touch(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_revert_swaps_values() {
        let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();

        let mut record = OverrideRecord::new("site.title", "My Portal", "Untitled", t0);
        record.revert(t1);

        assert_eq!(record.value, "Untitled");
        assert_eq!(record.prev_value, "My Portal");
        assert_eq!(record.updated_at, t1);
    }

    #[test]
    fn test_serialized_fields() {
        let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let record = OverrideRecord::new("site.title", "a", "b", t0);
        let json = serde_json::to_value(&record).unwrap();

        let mut fields: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        fields.sort();
        assert_eq!(fields, ["key", "prev_value", "updated_at", "value"]);
        assert_eq!(json["updated_at"], "2020-01-01T00:00:00Z");
    }
}
