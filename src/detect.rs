//! Existence-based change detection for license records.

use crate::license::LicenseRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// License ids already notified. Grows only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenState {
    #[serde(rename = "licenses", default)]
    pub seen_ids: BTreeSet<String>,
    #[serde(rename = "last_check", default, with = "timestamp")]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl SeenState {
    pub fn contains(&self, id: &str) -> bool {
        self.seen_ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen_ids.is_empty()
    }
}

/// Splits `records` into those whose id is not yet in `seen`, in input
/// order, and the state with those ids added. Content changes of a known id
/// are not news.
pub fn detect_new(records: &[LicenseRecord], seen: &SeenState) -> (Vec<LicenseRecord>, SeenState) {
    let mut updated = seen.clone();
    let mut new_records = vec![];

    for record in records {
        if updated.seen_ids.insert(record.license_id.clone()) {
            new_records.push(record.clone());
        }
    }

    (new_records, updated)
}

/// RFC 3339 out; RFC 3339 or a naive ISO-8601 timestamp (read as UTC) in.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(dt.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(Utc.from_utc_datetime(&naive)))
            .map_err(serde::de::Error::custom)
    }
}
