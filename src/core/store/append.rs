use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::error::StoreResult;
use super::kind::FieldValue;
use super::partition::{Partition, from_micros, to_micros};
use super::types::Snapshot;

/// A validated snapshot ready to be written to its partition.
pub(super) struct PreparedSnapshot {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub content: Value,
    pub status: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub metadata: Map<String, Value>,
    pub score: f64,
}

// updated_at must move forward on every rewrite even when two writes land in
// the same microsecond.
const UPSERT_SQL: &str = "INSERT INTO snapshots
        (id, timestamp, content, status, fields, metadata, score, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
    ON CONFLICT(id) DO UPDATE SET
        timestamp = excluded.timestamp,
        content = excluded.content,
        status = excluded.status,
        fields = excluded.fields,
        metadata = excluded.metadata,
        score = excluded.score,
        updated_at = MAX(excluded.updated_at, snapshots.updated_at + 1)
    RETURNING created_at, updated_at";

impl Partition {
    /// Upsert keyed by id and move the latest pointer, both in one immediate
    /// transaction.
    pub(super) async fn upsert(
        &self,
        snap: PreparedSnapshot,
        now: DateTime<Utc>,
    ) -> StoreResult<Snapshot> {
        let content = serde_json::to_string(&snap.content)?;
        let fields = serde_json::to_string(&snap.fields)?;
        let metadata = serde_json::to_string(&snap.metadata)?;
        let ts = to_micros(snap.timestamp);
        let now_us = to_micros(now);

        let (created_at, updated_at) = self
            .with_writer(|conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let stamps = tx.query_row(
                    UPSERT_SQL,
                    params![
                        snap.id,
                        ts,
                        content,
                        snap.status,
                        fields,
                        metadata,
                        snap.score,
                        now_us
                    ],
                    |row| Ok((from_micros(row.get(0)?, 0)?, from_micros(row.get(1)?, 1)?)),
                )?;
                advance_latest_pointer(&tx, &snap.id, ts)?;
                tx.commit()?;
                Ok(stamps)
            })
            .await?;

        Ok(Snapshot {
            id: snap.id,
            track: self.track.clone(),
            kind: self.kind,
            timestamp: snap.timestamp,
            content: snap.content,
            status: snap.status,
            fields: snap.fields,
            metadata: snap.metadata,
            created_at,
            updated_at,
        })
    }
}

fn advance_latest_pointer(conn: &Connection, id: &str, ts: i64) -> rusqlite::Result<()> {
    let current: Option<(String, i64)> = conn
        .query_row(
            "SELECT snapshot_id, timestamp FROM latest_pointer WHERE slot = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match current {
        Some((current_id, current_ts)) if ts < current_ts => {
            // The latest record was rewritten with an earlier event time, so
            // another record may now be the newest.
            if current_id == id {
                recompute_latest_pointer(conn)?;
            }
            Ok(())
        }
        _ => set_latest_pointer(conn, id, ts),
    }
}

fn set_latest_pointer(conn: &Connection, id: &str, ts: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO latest_pointer (slot, snapshot_id, timestamp) VALUES (1, ?1, ?2)
         ON CONFLICT(slot) DO UPDATE SET
            snapshot_id = excluded.snapshot_id,
            timestamp = excluded.timestamp",
        params![id, ts],
    )?;
    Ok(())
}

pub(super) fn recompute_latest_pointer(conn: &Connection) -> rusqlite::Result<()> {
    let newest: Option<(String, i64)> = conn
        .query_row(
            "SELECT id, timestamp FROM snapshots
             ORDER BY timestamp DESC, updated_at DESC, id ASC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match newest {
        Some((id, ts)) => set_latest_pointer(conn, &id, ts),
        None => {
            conn.execute("DELETE FROM latest_pointer", [])?;
            Ok(())
        }
    }
}
