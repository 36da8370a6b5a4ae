use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::error::{StoreError, StoreResult};
use super::kind::TrackKind;
use super::types::Snapshot;
use crate::platform::{NativePlatform, Platform};

/// Lock wait applied when another process holds the partition's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Reader connections kept around after use.
const MAX_IDLE_READERS: usize = 4;

pub(super) const SNAPSHOT_COLUMNS: &str =
    "id, timestamp, content, status, fields, metadata, created_at, updated_at";

/// One track's storage: a single SQLite file in WAL mode.
///
/// Writes go through one connection behind an async mutex; reads check out a
/// pooled connection and run in their own read transaction, so they never
/// wait on the writer mutex.
pub(super) struct Partition {
    pub(super) track: String,
    pub(super) kind: TrackKind,
    path: PathBuf,
    pub(super) writer: Mutex<Connection>,
    readers: StdMutex<Vec<Connection>>,
}

impl Partition {
    pub(super) fn open(track: &str, kind: TrackKind, path: &Path) -> StoreResult<Self> {
        let conn = open_connection(path)?;
        init_schema(&conn)?;
        check_kind(&conn, track, kind)?;
        NativePlatform::restrict_file_permissions(path);
        debug!("Opened partition [{}] at {}", track, path.display());

        Ok(Self {
            track: track.to_string(),
            kind,
            path: path.to_path_buf(),
            writer: Mutex::new(conn),
            readers: StdMutex::new(Vec::new()),
        })
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` inside a deferred read transaction on a pooled connection.
    pub(super) fn with_reader<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        let conn = self.checkout()?;
        let result: rusqlite::Result<T> = (|| {
            let tx = conn.unchecked_transaction()?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })();
        self.checkin(conn);
        result.map_err(StoreError::from)
    }

    /// Run `f` with exclusive use of the writer connection.
    pub(super) async fn with_writer<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.writer.lock().await;
        f(&mut conn)
    }

    fn checkout(&self) -> StoreResult<Connection> {
        let pooled = self
            .readers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => open_reader(&self.path),
        }
    }

    fn checkin(&self, conn: Connection) {
        let mut pool = self
            .readers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if pool.len() < MAX_IDLE_READERS {
            pool.push(conn);
        }
    }

    pub(super) fn decode_row(&self, row: &Row<'_>) -> rusqlite::Result<Snapshot> {
        Ok(Snapshot {
            id: row.get(0)?,
            track: self.track.clone(),
            kind: self.kind,
            timestamp: from_micros(row.get(1)?, 1)?,
            content: decode_json(row.get(2)?, 2)?,
            status: row.get(3)?,
            fields: decode_json(row.get(4)?, 4)?,
            metadata: decode_json(row.get(5)?, 5)?,
            created_at: from_micros(row.get(6)?, 6)?,
            updated_at: from_micros(row.get(7)?, 7)?,
        })
    }
}

fn open_connection(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

fn open_reader(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS snapshots (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            content TEXT NOT NULL,
            status TEXT NOT NULL,
            fields TEXT NOT NULL,
            metadata TEXT NOT NULL,
            score REAL NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp
            ON snapshots(timestamp DESC, updated_at DESC, id);
        CREATE INDEX IF NOT EXISTS idx_snapshots_score
            ON snapshots(score DESC, timestamp DESC, id);
        CREATE TABLE IF NOT EXISTS latest_pointer (
            slot INTEGER PRIMARY KEY CHECK (slot = 1),
            snapshot_id TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS partition_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// A partition remembers the kind it was created with; reopening it under a
/// different kind would reinterpret stored fields, so that is refused.
fn check_kind(conn: &Connection, track: &str, kind: TrackKind) -> StoreResult<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM partition_meta WHERE key = 'kind'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match stored {
        None => {
            conn.execute(
                "INSERT INTO partition_meta (key, value) VALUES ('kind', ?1), ('track', ?2)",
                params![kind.as_str(), track],
            )?;
            Ok(())
        }
        Some(existing) if existing == kind.as_str() => Ok(()),
        Some(existing) => Err(StoreError::Validation(format!(
            "partition for track '{}' was created as kind '{}', configured as '{}'",
            track, existing, kind
        ))),
    }
}

pub(super) fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub(super) fn from_micros(value: i64, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(value).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn decode_json<T: DeserializeOwned>(text: String, idx: usize) -> rusqlite::Result<T> {
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
