mod append;
pub mod error;
pub mod kind;
mod partition;
mod query;
pub mod registry;
mod retention;
pub mod types;

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use crate::platform::{NativePlatform, Platform};
use append::PreparedSnapshot;
use partition::Partition;

pub use error::{StoreError, StoreResult};
pub use kind::{FieldValue, TrackKind};
pub use registry::TrackRegistry;
pub use types::{RetentionPolicy, Snapshot, SnapshotDraft, TrackStats, derive_snapshot_id};

const DEFAULT_STATUS: &str = "new";

/// Per-track durable snapshot storage.
///
/// Every registered track owns one SQLite partition under `<root>/tracks/`.
/// Tracks share nothing, so a slow cleanup on one never blocks appends or
/// reads on another.
pub struct TrackStore {
    root: PathBuf,
    registry: TrackRegistry,
    partitions: HashMap<String, Arc<Partition>>,
}

impl TrackStore {
    pub async fn open<P: AsRef<Path>>(root: P, registry: TrackRegistry) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        let tracks_dir = root.join("tracks");
        if !tracks_dir.exists() {
            fs::create_dir_all(&tracks_dir).await?;
        }
        NativePlatform::restrict_dir_permissions(&root);
        NativePlatform::restrict_dir_permissions(&tracks_dir);

        if registry.is_empty() {
            warn!("Track store opened with no registered tracks; every append will be refused");
        }
        let mut partitions = HashMap::new();
        for def in registry.iter() {
            let path = tracks_dir.join(format!("{}.db", def.name));
            let partition = Partition::open(&def.name, def.kind, &path)?;
            partitions.insert(def.name.clone(), Arc::new(partition));
        }

        info!(
            "Track store ready at {} ({} track(s))",
            root.display(),
            registry.len()
        );
        Ok(Self {
            root,
            registry,
            partitions,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    fn partition(&self, track: &str) -> StoreResult<&Arc<Partition>> {
        self.partitions
            .get(track)
            .ok_or_else(|| StoreError::UnknownTrack(track.to_string()))
    }

    /// Persist a snapshot, replacing any earlier record with the same id.
    ///
    /// Kind fields that are missing or malformed take their defaults; fields
    /// the kind does not declare are kept under `metadata.extra_fields`. The
    /// returned record is what a subsequent read would see.
    pub async fn append(&self, track: &str, draft: SnapshotDraft) -> StoreResult<Snapshot> {
        let partition = self.partition(track)?;

        if let Some(id) = &draft.id
            && id.trim().is_empty()
        {
            return Err(StoreError::Validation(
                "snapshot id must not be blank".to_string(),
            ));
        }

        let now = Utc::now();
        let supplied_ts = draft.timestamp.map(truncate_to_micros);
        let timestamp = supplied_ts.unwrap_or_else(|| truncate_to_micros(now));
        let status = draft
            .status
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STATUS.to_string());

        let (fields, extras) = partition.kind.normalize_fields(&draft.fields);
        let mut metadata = draft.metadata;
        if !extras.is_empty() {
            match metadata.get_mut("extra_fields") {
                Some(Value::Object(existing)) => existing.extend(extras),
                _ => {
                    metadata.insert("extra_fields".to_string(), Value::Object(extras));
                }
            }
        }

        let score = fields
            .get(partition.kind.ranking_field())
            .and_then(FieldValue::as_f64)
            .unwrap_or(0.0);
        let id = draft
            .id
            .unwrap_or_else(|| derive_snapshot_id(track, supplied_ts, &draft.content));

        let prepared = PreparedSnapshot {
            id,
            timestamp,
            content: draft.content,
            status,
            fields,
            metadata,
            score,
        };
        partition.upsert(prepared, now).await
    }

    /// Snapshots with `timestamp >= since`, newest first, at most `limit`.
    pub async fn query(
        &self,
        track: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Snapshot>> {
        self.partition(track)?.query(since, limit)
    }

    pub async fn latest(&self, track: &str) -> StoreResult<Option<Snapshot>> {
        self.partition(track)?.latest()
    }

    #[cfg(test)]
    pub async fn count(&self, track: &str) -> StoreResult<u64> {
        self.partition(track)?.count()
    }

    pub async fn ranked_by_field(
        &self,
        track: &str,
        field: &str,
        min_threshold: f64,
        limit: usize,
    ) -> StoreResult<Vec<Snapshot>> {
        let partition = self.partition(track)?;
        if !partition.kind.has_numeric_field(field) {
            return Err(StoreError::Validation(format!(
                "'{}' is not a numeric field of {} track '{}'",
                field, partition.kind, track
            )));
        }
        partition.ranked_by_field(field, min_threshold, limit)
    }

    /// Ranking over every track whose kind declares `field`. Ties fall back to
    /// timestamp, then id, then track name.
    pub async fn ranked_across_tracks(
        &self,
        field: &str,
        min_threshold: f64,
        limit: usize,
    ) -> StoreResult<Vec<Snapshot>> {
        let mut merged = Vec::new();
        let mut eligible = 0usize;
        for def in self.registry.iter() {
            if !def.kind.has_numeric_field(field) {
                continue;
            }
            eligible += 1;
            let partition = self.partition(&def.name)?;
            merged.extend(partition.ranked_by_field(field, min_threshold, limit)?);
        }
        if eligible == 0 {
            return Err(StoreError::Validation(format!(
                "no registered track has a numeric field '{}'",
                field
            )));
        }

        merged.sort_by(|a, b| {
            let av = a.number(field).unwrap_or(f64::MIN);
            let bv = b.number(field).unwrap_or(f64::MIN);
            bv.total_cmp(&av)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
                .then_with(|| a.id.cmp(&b.id))
                .then_with(|| a.track.cmp(&b.track))
        });
        merged.truncate(limit);
        Ok(merged)
    }

    /// Apply a retention policy to every track, one transaction per track.
    pub async fn cleanup(&self, policy: RetentionPolicy) -> StoreResult<BTreeMap<String, usize>> {
        self.cleanup_as_of(policy, Utc::now()).await
    }

    /// Same as [`Self::cleanup`] with an explicit reference time for the
    /// `KeepDays` cutoff.
    pub async fn cleanup_as_of(
        &self,
        policy: RetentionPolicy,
        now: DateTime<Utc>,
    ) -> StoreResult<BTreeMap<String, usize>> {
        let mut report = BTreeMap::new();
        for def in self.registry.iter() {
            let partition = self.partition(&def.name)?;
            let deleted = partition.cleanup(policy, now).await.inspect_err(|e| {
                warn!("Cleanup of track [{}] failed: {}", def.name, e);
            })?;
            report.insert(def.name.clone(), deleted);
        }
        let total: usize = report.values().sum();
        info!("Retention run ({}) deleted {} snapshot(s)", policy, total);
        Ok(report)
    }

    pub async fn stats(&self) -> StoreResult<Vec<TrackStats>> {
        let mut stats = Vec::with_capacity(self.registry.len());
        for def in self.registry.iter() {
            stats.push(self.partition(&def.name)?.stats()?);
        }
        Ok(stats)
    }
}

/// Storage keeps microseconds; trim up front so the returned record matches
/// what later reads produce.
fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn test_registry() -> TrackRegistry {
        TrackRegistry::new()
            .with("alpha_discovery", TrackKind::Discovery)
            .with("sentiment_analysis", TrackKind::Sentiment)
            .with("technical_analysis", TrackKind::Technical)
            .with("risk_assessment", TrackKind::Risk)
    }

    async fn test_store() -> (tempfile::TempDir, TrackStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TrackStore::open(dir.path(), test_registry()).await.unwrap();
        (dir, store)
    }

    fn ts(offset_secs: i64) -> DateTime<Utc> {
        truncate_to_micros(Utc::now()) + Duration::seconds(offset_secs)
    }

    #[tokio::test]
    async fn append_then_latest_returns_the_record() {
        let (_dir, store) = test_store().await;
        let stored = store
            .append(
                "alpha_discovery",
                SnapshotDraft::new("BTC breakout").with_field("confidence", 0.8),
            )
            .await
            .unwrap();
        assert_eq!(stored.status, "new");
        assert_eq!(stored.number("confidence"), Some(0.8));
        assert_eq!(stored.created_at, stored.updated_at);

        let latest = store.latest("alpha_discovery").await.unwrap().unwrap();
        assert_eq!(latest, stored);
    }

    #[tokio::test]
    async fn reappend_replaces_and_advances_updated_at() {
        let (_dir, store) = test_store().await;
        let at = ts(0);
        let draft = SnapshotDraft::new(json!({"title": "ETH"}))
            .at(at)
            .with_field("confidence", 0.4);
        let first = store.append("alpha_discovery", draft.clone()).await.unwrap();
        let second = store.append("alpha_discovery", draft).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(store.count("alpha_discovery").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_track_is_rejected_without_side_effects() {
        let (_dir, store) = test_store().await;
        let before: u64 = {
            let mut total = 0;
            for s in store.stats().await.unwrap() {
                total += s.count;
            }
            total
        };
        let err = store
            .append("weather", SnapshotDraft::new("sunny"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownTrack(ref t) if t == "weather"));

        let after: u64 = store.stats().await.unwrap().iter().map(|s| s.count).sum();
        assert_eq!(before, after);
        assert!(matches!(
            store.latest("weather").await,
            Err(StoreError::UnknownTrack(_))
        ));
    }

    #[tokio::test]
    async fn empty_registry_opens_but_serves_no_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrackStore::open(dir.path(), TrackRegistry::new()).await.unwrap();
        assert!(store.registry().is_empty());
        assert!(store.stats().await.unwrap().is_empty());
        assert!(matches!(
            store.append("alpha_discovery", SnapshotDraft::new("x")).await,
            Err(StoreError::UnknownTrack(_))
        ));
    }

    #[tokio::test]
    async fn blank_id_is_a_validation_error() {
        let (_dir, store) = test_store().await;
        let err = store
            .append("alpha_discovery", SnapshotDraft::new("x").with_id("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(store.count("alpha_discovery").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_kind_fields_default_and_unknown_fields_are_kept() {
        let (_dir, store) = test_store().await;
        let stored = store
            .append(
                "risk_assessment",
                SnapshotDraft::new("exposure check")
                    .with_field("drawdown", 0.12)
                    .with_metadata("model", "v2"),
            )
            .await
            .unwrap();
        assert_eq!(stored.number("risk_score"), Some(0.0));
        assert_eq!(
            stored.fields.get("risk_level"),
            Some(&FieldValue::Text("unknown".to_string()))
        );
        assert_eq!(stored.metadata["model"], json!("v2"));
        assert_eq!(stored.metadata["extra_fields"]["drawdown"], json!(0.12));
    }

    #[tokio::test]
    async fn derived_id_is_stable_across_identical_appends() {
        let (_dir, store) = test_store().await;
        let at = ts(-60);
        let a = store
            .append("alpha_discovery", SnapshotDraft::new(json!({"a": 1, "b": 2})).at(at))
            .await
            .unwrap();
        let b = store
            .append(
                "alpha_discovery",
                SnapshotDraft::new(serde_json::from_str::<Value>(r#"{"b":2,"a":1}"#).unwrap())
                    .at(at),
            )
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(
            a.id,
            derive_snapshot_id("alpha_discovery", Some(at), &json!({"a": 1, "b": 2}))
        );
        assert_eq!(store.count("alpha_discovery").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn redelivery_without_id_or_timestamp_is_idempotent() {
        let (_dir, store) = test_store().await;
        let draft = SnapshotDraft::new("BTC breakout").with_field("confidence", 0.8);
        let first = store.append("alpha_discovery", draft.clone()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.append("alpha_discovery", draft).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(store.count("alpha_discovery").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_filters_by_window_and_sorts_newest_first() {
        let (_dir, store) = test_store().await;
        for (label, offset) in [("old", -7200), ("mid", -1800), ("new", -60)] {
            store
                .append("alpha_discovery", SnapshotDraft::new(label).at(ts(offset)))
                .await
                .unwrap();
        }

        let recent = store
            .query("alpha_discovery", ts(-3600), 10)
            .await
            .unwrap();
        let labels: Vec<&Value> = recent.iter().map(|s| &s.content).collect();
        assert_eq!(labels, [&json!("new"), &json!("mid")]);

        let capped = store
            .query("alpha_discovery", ts(-86400), 1)
            .await
            .unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].content, json!("new"));

        let empty = store.query("risk_assessment", ts(-86400), 10).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn latest_pointer_only_moves_forward_in_event_time() {
        let (_dir, store) = test_store().await;
        let newer = store
            .append("alpha_discovery", SnapshotDraft::new("newer").at(ts(-10)))
            .await
            .unwrap();
        store
            .append("alpha_discovery", SnapshotDraft::new("older").at(ts(-100)))
            .await
            .unwrap();
        let latest = store.latest("alpha_discovery").await.unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
    }

    #[tokio::test]
    async fn equal_timestamps_go_to_the_newer_write() {
        let (_dir, store) = test_store().await;
        let at = ts(-5);
        store
            .append("alpha_discovery", SnapshotDraft::new("first").at(at))
            .await
            .unwrap();
        let second = store
            .append("alpha_discovery", SnapshotDraft::new("second").at(at))
            .await
            .unwrap();
        let latest = store.latest("alpha_discovery").await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[tokio::test]
    async fn rewriting_latest_into_the_past_recomputes_the_pointer() {
        let (_dir, store) = test_store().await;
        let a = store
            .append("alpha_discovery", SnapshotDraft::new("a").with_id("a").at(ts(-10)))
            .await
            .unwrap();
        let b = store
            .append("alpha_discovery", SnapshotDraft::new("b").with_id("b").at(ts(-20)))
            .await
            .unwrap();
        assert_eq!(store.latest("alpha_discovery").await.unwrap().unwrap().id, a.id);

        store
            .append("alpha_discovery", SnapshotDraft::new("a2").with_id("a").at(ts(-30)))
            .await
            .unwrap();
        assert_eq!(store.latest("alpha_discovery").await.unwrap().unwrap().id, b.id);
    }

    #[tokio::test]
    async fn ranking_breaks_ties_by_timestamp_then_id() {
        let (_dir, store) = test_store().await;
        let t1 = ts(-300);
        let t2 = ts(-200);
        let t3 = ts(-100);
        for (id, conf, at) in [("x1", 0.9, t1), ("x2", 0.9, t2), ("x3", 0.5, t3)] {
            store
                .append(
                    "alpha_discovery",
                    SnapshotDraft::new(id).with_id(id).at(at).with_field("confidence", conf),
                )
                .await
                .unwrap();
        }

        let ranked = store
            .ranked_by_field("alpha_discovery", "confidence", 0.0, 10)
            .await
            .unwrap();
        let ids: Vec<&str> = ranked.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["x2", "x1", "x3"]);

        let strong = store
            .ranked_by_field("alpha_discovery", "confidence", 0.6, 10)
            .await
            .unwrap();
        assert_eq!(strong.len(), 2);
    }

    #[tokio::test]
    async fn ranking_by_secondary_numeric_field() {
        let (_dir, store) = test_store().await;
        for (id, score) in [("bear", -0.7), ("bull", 0.6), ("flat", 0.0)] {
            store
                .append(
                    "sentiment_analysis",
                    SnapshotDraft::new(id)
                        .with_id(id)
                        .with_field("sentiment_score", score)
                        .with_field("confidence", 0.5),
                )
                .await
                .unwrap();
        }
        let ranked = store
            .ranked_by_field("sentiment_analysis", "sentiment_score", -0.5, 10)
            .await
            .unwrap();
        let ids: Vec<&str> = ranked.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["bull", "flat"]);
    }

    #[tokio::test]
    async fn ranking_by_text_or_unknown_field_is_rejected() {
        let (_dir, store) = test_store().await;
        assert!(matches!(
            store.ranked_by_field("sentiment_analysis", "source", 0.0, 10).await,
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.ranked_by_field("alpha_discovery", "risk_score", 0.0, 10).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn ranking_across_tracks_skips_tracks_without_the_field() {
        let (_dir, store) = test_store().await;
        store
            .append(
                "alpha_discovery",
                SnapshotDraft::new("a").with_id("a").with_field("confidence", 0.7),
            )
            .await
            .unwrap();
        store
            .append(
                "sentiment_analysis",
                SnapshotDraft::new("s").with_id("s").with_field("confidence", 0.9),
            )
            .await
            .unwrap();
        store
            .append(
                "technical_analysis",
                SnapshotDraft::new("t").with_id("t").with_field("signal_strength", 1.0),
            )
            .await
            .unwrap();

        let ranked = store
            .ranked_across_tracks("confidence", 0.0, 10)
            .await
            .unwrap();
        let tracks: Vec<&str> = ranked.iter().map(|s| s.track.as_str()).collect();
        assert_eq!(tracks, ["sentiment_analysis", "alpha_discovery"]);

        assert!(matches!(
            store.ranked_across_tracks("volume", 0.0, 10).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn keep_days_deletes_stale_history_but_not_latest() {
        let (_dir, store) = test_store().await;
        let now = truncate_to_micros(Utc::now());
        let stale = store
            .append(
                "alpha_discovery",
                SnapshotDraft::new("stale").at(now - Duration::days(10)),
            )
            .await
            .unwrap();
        let fresh = store
            .append(
                "alpha_discovery",
                SnapshotDraft::new("fresh").at(now - Duration::days(1)),
            )
            .await
            .unwrap();

        let report = store
            .cleanup_as_of(RetentionPolicy::KeepDays(7), now)
            .await
            .unwrap();
        assert_eq!(report["alpha_discovery"], 1);
        assert_eq!(report["risk_assessment"], 0);

        let remaining = store
            .query("alpha_discovery", now - Duration::days(30), 10)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, fresh.id);
        assert_ne!(remaining[0].id, stale.id);
    }

    #[tokio::test]
    async fn single_stale_snapshot_survives_cleanup() {
        let (_dir, store) = test_store().await;
        let now = truncate_to_micros(Utc::now());
        let only = store
            .append(
                "risk_assessment",
                SnapshotDraft::new("ancient").at(now - Duration::days(90)),
            )
            .await
            .unwrap();

        let report = store
            .cleanup_as_of(RetentionPolicy::KeepDays(7), now)
            .await
            .unwrap();
        assert_eq!(report["risk_assessment"], 0);
        assert_eq!(store.latest("risk_assessment").await.unwrap().unwrap().id, only.id);
    }

    #[tokio::test]
    async fn keep_latest_trims_to_newest_records() {
        let (_dir, store) = test_store().await;
        for i in 0..5 {
            store
                .append(
                    "technical_analysis",
                    SnapshotDraft::new(format!("signal {i}")).at(ts(-100 + i)),
                )
                .await
                .unwrap();
        }
        let report = store.cleanup(RetentionPolicy::KeepLatest(2)).await.unwrap();
        assert_eq!(report["technical_analysis"], 3);
        assert_eq!(store.count("technical_analysis").await.unwrap(), 2);

        // Zero still keeps the latest record.
        store.cleanup(RetentionPolicy::KeepLatest(0)).await.unwrap();
        let latest = store.latest("technical_analysis").await.unwrap().unwrap();
        assert_eq!(latest.content, json!("signal 4"));
        assert_eq!(store.count("technical_analysis").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn wipe_removes_everything_including_latest() {
        let (_dir, store) = test_store().await;
        store
            .append("alpha_discovery", SnapshotDraft::new("a"))
            .await
            .unwrap();
        store
            .append("alpha_discovery", SnapshotDraft::new("b").at(ts(-30)))
            .await
            .unwrap();

        let report = store.cleanup(RetentionPolicy::Wipe).await.unwrap();
        assert_eq!(report["alpha_discovery"], 2);
        assert!(store.latest("alpha_discovery").await.unwrap().is_none());

        // The store keeps working after a wipe.
        let next = store
            .append("alpha_discovery", SnapshotDraft::new("c"))
            .await
            .unwrap();
        assert_eq!(store.latest("alpha_discovery").await.unwrap().unwrap().id, next.id);
    }

    #[tokio::test]
    async fn stats_report_counts_and_latest_time() {
        let (_dir, store) = test_store().await;
        let at = ts(-42);
        store
            .append("alpha_discovery", SnapshotDraft::new("a").at(at))
            .await
            .unwrap();
        store
            .append("alpha_discovery", SnapshotDraft::new("b").at(ts(-100)))
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.len(), 4);
        let alpha = stats.iter().find(|s| s.track == "alpha_discovery").unwrap();
        assert_eq!(alpha.count, 2);
        assert_eq!(alpha.latest_timestamp, Some(at));
        assert!(alpha.size_bytes > 0);

        let risk = stats.iter().find(|s| s.track == "risk_assessment").unwrap();
        assert_eq!(risk.count, 0);
        assert_eq!(risk.latest_timestamp, None);
    }

    #[tokio::test]
    async fn snapshots_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let stored = {
            let store = TrackStore::open(dir.path(), test_registry()).await.unwrap();
            store
                .append(
                    "alpha_discovery",
                    SnapshotDraft::new("durable").with_field("confidence", 0.3),
                )
                .await
                .unwrap()
        };

        let reopened = TrackStore::open(dir.path(), test_registry()).await.unwrap();
        let latest = reopened.latest("alpha_discovery").await.unwrap().unwrap();
        assert_eq!(latest, stored);
    }

    #[tokio::test]
    async fn reopening_with_a_different_kind_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        TrackStore::open(dir.path(), test_registry()).await.unwrap();

        let conflicting = TrackRegistry::new().with("alpha_discovery", TrackKind::Risk);
        assert!(matches!(
            TrackStore::open(dir.path(), conflicting).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_persisted() {
        let (_dir, store) = test_store().await;
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..24 {
            let store = store.clone();
            let track = if i % 2 == 0 { "alpha_discovery" } else { "risk_assessment" };
            handles.push(tokio::spawn(async move {
                store
                    .append(track, SnapshotDraft::new(format!("item {i}")).at(ts(-i)))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.count("alpha_discovery").await.unwrap(), 12);
        assert_eq!(store.count("risk_assessment").await.unwrap(), 12);
    }

    #[tokio::test]
    async fn two_handles_on_one_directory_share_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let producer = TrackStore::open(dir.path(), test_registry()).await.unwrap();
        let reader = TrackStore::open(dir.path(), test_registry()).await.unwrap();

        let stored = producer
            .append("alpha_discovery", SnapshotDraft::new("from producer"))
            .await
            .unwrap();
        let seen = reader.latest("alpha_discovery").await.unwrap().unwrap();
        assert_eq!(seen.id, stored.id);
    }

    #[tokio::test]
    async fn held_writer_does_not_block_other_tracks_or_readers() {
        let (_dir, store) = test_store().await;
        store
            .append("alpha_discovery", SnapshotDraft::new("seed"))
            .await
            .unwrap();

        let alpha = store.partition("alpha_discovery").unwrap().clone();
        let _guard = alpha.writer.lock().await;

        let timeout = std::time::Duration::from_secs(2);
        tokio::time::timeout(
            timeout,
            store.append("risk_assessment", SnapshotDraft::new("independent")),
        )
        .await
        .expect("append to another track blocked")
        .unwrap();

        let latest = tokio::time::timeout(timeout, store.latest("alpha_discovery"))
            .await
            .expect("read blocked on writer")
            .unwrap();
        assert!(latest.is_some());
    }
}
