use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use super::error::StoreResult;
use super::partition::{Partition, SNAPSHOT_COLUMNS, from_micros, to_micros};
use super::types::{Snapshot, TrackStats};

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl Partition {
    /// Snapshots with `timestamp >= since`, newest first.
    pub(super) fn query(&self, since: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Snapshot>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
                 WHERE timestamp >= ?1
                 ORDER BY timestamp DESC, updated_at DESC, id ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![to_micros(since), sql_limit(limit)], |row| {
                self.decode_row(row)
            })?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })
    }

    pub(super) fn latest(&self) -> StoreResult<Option<Snapshot>> {
        self.with_reader(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
                     WHERE id = (SELECT snapshot_id FROM latest_pointer WHERE slot = 1)"
                ),
                [],
                |row| self.decode_row(row),
            )
            .optional()
        })
    }

    /// Sorted by `field` descending, then timestamp descending, then id
    /// ascending. The caller has checked that `field` is numeric for this kind.
    pub(super) fn ranked_by_field(
        &self,
        field: &str,
        min_threshold: f64,
        limit: usize,
    ) -> StoreResult<Vec<Snapshot>> {
        self.with_reader(|conn| {
            let mut results = Vec::new();
            if field == self.kind.ranking_field() {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
                     WHERE score >= ?1
                     ORDER BY score DESC, timestamp DESC, id ASC
                     LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![min_threshold, sql_limit(limit)], |row| {
                    self.decode_row(row)
                })?;
                for row in rows {
                    results.push(row?);
                }
            } else {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
                     WHERE CAST(json_extract(fields, ?1) AS REAL) >= ?2
                     ORDER BY CAST(json_extract(fields, ?1) AS REAL) DESC, timestamp DESC, id ASC
                     LIMIT ?3"
                ))?;
                let path = format!("$.{}", field);
                let rows = stmt.query_map(params![path, min_threshold, sql_limit(limit)], |row| {
                    self.decode_row(row)
                })?;
                for row in rows {
                    results.push(row?);
                }
            }
            Ok(results)
        })
    }

    #[cfg(test)]
    pub(super) fn count(&self) -> StoreResult<u64> {
        self.with_reader(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
    }

    pub(super) fn stats(&self) -> StoreResult<TrackStats> {
        let (count, latest_timestamp) = self.with_reader(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
            let latest: Option<i64> = conn
                .query_row(
                    "SELECT timestamp FROM latest_pointer WHERE slot = 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            let latest = latest.map(|v| from_micros(v, 0)).transpose()?;
            Ok((count.max(0) as u64, latest))
        })?;

        let mut size_bytes = std::fs::metadata(self.path())?.len();
        let mut wal = self.path().as_os_str().to_owned();
        wal.push("-wal");
        if let Ok(meta) = std::fs::metadata(&wal) {
            size_bytes += meta.len();
        }

        Ok(TrackStats {
            track: self.track.clone(),
            kind: self.kind,
            count,
            latest_timestamp,
            size_bytes,
        })
    }
}
