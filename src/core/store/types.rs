use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::kind::{FieldValue, TrackKind};

/// Producer-facing input for [`super::TrackStore::append`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotDraft {
    /// Stable identity. Derived from the content when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Event time. Defaults to the time of the append.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SnapshotDraft {
    pub fn new(content: impl Into<Value>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Content-addressed identity: SHA-256 over the track, the producer's event
/// time in microseconds (when it supplied one) and the canonical (sorted-key)
/// JSON of the content. Store-assigned defaults never feed the digest, so a
/// retried delivery maps to the same id.
pub fn derive_snapshot_id(track: &str, timestamp: Option<DateTime<Utc>>, content: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(track.as_bytes());
    hasher.update([0u8]);
    match timestamp {
        Some(ts) => {
            hasher.update([1u8]);
            hasher.update(ts.timestamp_micros().to_be_bytes());
        }
        None => hasher.update([0u8]),
    }
    hasher.update([0u8]);
    // serde_json's Map is ordered by key, so this encoding is canonical.
    hasher.update(content.to_string().as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// One persisted unit of track output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub id: String,
    pub track: String,
    pub kind: TrackKind,
    pub timestamp: DateTime<Utc>,
    pub content: Value,
    pub status: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(FieldValue::as_f64)
    }

    /// Value of the kind's confidence-equivalent field.
    pub fn score(&self) -> f64 {
        self.number(self.kind.ranking_field()).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackStats {
    pub track: String,
    pub kind: TrackKind,
    pub count: u64,
    pub latest_timestamp: Option<DateTime<Utc>>,
    pub size_bytes: u64,
}

/// Which historical snapshots a cleanup run may delete. Only `Wipe` touches a
/// track's latest snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    KeepDays(u32),
    KeepLatest(usize),
    Wipe,
}

impl std::fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetentionPolicy::KeepDays(d) => write!(f, "keep {} day(s)", d),
            RetentionPolicy::KeepLatest(n) => write!(f, "keep latest {}", n),
            RetentionPolicy::Wipe => f.write_str("wipe"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn derived_id_ignores_key_order() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": [1, 2]}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": [1, 2], "b": 1}"#).unwrap();
        assert_eq!(
            derive_snapshot_id("alpha_discovery", Some(ts), &a),
            derive_snapshot_id("alpha_discovery", Some(ts), &b)
        );
    }

    #[test]
    fn derived_id_depends_on_track_and_time() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let content = json!("BTC breakout");
        let base = derive_snapshot_id("alpha_discovery", Some(ts), &content);
        assert!(base.starts_with("sha256:"));
        assert_ne!(base, derive_snapshot_id("risk_assessment", Some(ts), &content));
        assert_ne!(
            base,
            derive_snapshot_id(
                "alpha_discovery",
                Some(ts + chrono::Duration::seconds(1)),
                &content
            )
        );
    }

    #[test]
    fn derived_id_without_event_time_depends_only_on_content() {
        let content = json!({"title": "BTC breakout"});
        let untimed = derive_snapshot_id("alpha_discovery", None, &content);
        assert_eq!(untimed, derive_snapshot_id("alpha_discovery", None, &content));
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_ne!(untimed, derive_snapshot_id("alpha_discovery", Some(ts), &content));
    }

    #[test]
    fn draft_deserializes_with_only_content() {
        let draft: SnapshotDraft = serde_json::from_value(json!({"content": "hello"})).unwrap();
        assert!(draft.id.is_none());
        assert!(draft.timestamp.is_none());
        assert!(draft.fields.is_empty());
    }
}
