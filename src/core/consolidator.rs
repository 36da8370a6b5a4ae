use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::core::store::{Snapshot, StoreResult, TrackKind, TrackStore};

const SUMMARY_MAX_CHARS: usize = 200;
const SUMMARY_KEYS: [&str; 4] = ["summary", "title", "description", "text"];

fn default_lookback_hours() -> u64 {
    24
}

fn default_per_track_limit() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatorConfig {
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,
    #[serde(default = "default_per_track_limit")]
    pub per_track_limit: usize,
}

impl Default for ConsolidatorConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            per_track_limit: default_per_track_limit(),
        }
    }
}

/// A ranked, display-ready projection of one snapshot. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Opportunity {
    pub track: String,
    pub kind: TrackKind,
    pub snapshot_id: String,
    pub summary: String,
    pub score: f64,
    pub status: String,
    pub discovered_at: DateTime<Utc>,
}

impl From<&Snapshot> for Opportunity {
    fn from(snap: &Snapshot) -> Self {
        Self {
            track: snap.track.clone(),
            kind: snap.kind,
            snapshot_id: snap.id.clone(),
            summary: summarize(&snap.content),
            score: snap.score(),
            status: snap.status.clone(),
            discovered_at: snap.timestamp,
        }
    }
}

/// Merges recent snapshots from every track into one ranked list.
///
/// Holds no state of its own; two calls with no writes in between return the
/// same list.
pub struct Consolidator {
    store: Arc<TrackStore>,
    config: ConsolidatorConfig,
}

impl Consolidator {
    pub fn new(store: Arc<TrackStore>, config: ConsolidatorConfig) -> Self {
        Self { store, config }
    }

    pub async fn consolidate(&self, min_confidence: f64, limit: usize) -> StoreResult<Vec<Opportunity>> {
        self.consolidate_as_of(Utc::now(), min_confidence, limit).await
    }

    pub async fn consolidate_as_of(
        &self,
        now: DateTime<Utc>,
        min_confidence: f64,
        limit: usize,
    ) -> StoreResult<Vec<Opportunity>> {
        let since = i64::try_from(self.config.lookback_hours)
            .ok()
            .and_then(Duration::try_hours)
            .and_then(|lookback| now.checked_sub_signed(lookback))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut opportunities = Vec::new();
        for def in self.store.registry().iter() {
            let recent = self
                .store
                .query(&def.name, since, self.config.per_track_limit)
                .await?;
            opportunities.extend(
                recent
                    .iter()
                    .map(Opportunity::from)
                    .filter(|o| o.score >= min_confidence),
            );
        }

        opportunities.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.discovered_at.cmp(&a.discovered_at))
                .then_with(|| a.track.cmp(&b.track))
                .then_with(|| a.snapshot_id.cmp(&b.snapshot_id))
        });
        opportunities.truncate(limit);
        Ok(opportunities)
    }
}

/// Best-effort one-line description of opaque snapshot content.
pub fn summarize(content: &Value) -> String {
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Object(map) => SUMMARY_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| content.to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    truncate_chars(text.trim(), SUMMARY_MAX_CHARS)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
