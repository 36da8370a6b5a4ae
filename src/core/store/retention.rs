use chrono::{DateTime, Duration, Utc};
use rusqlite::{TransactionBehavior, params};
use tracing::debug;

use super::append::recompute_latest_pointer;
use super::error::StoreResult;
use super::partition::{Partition, to_micros};
use super::types::RetentionPolicy;

impl Partition {
    /// Apply `policy` in a single immediate transaction and return the number
    /// of snapshots deleted. The snapshot behind the latest pointer survives
    /// every policy except `Wipe`.
    pub(super) async fn cleanup(&self, policy: RetentionPolicy, now: DateTime<Utc>) -> StoreResult<usize> {
        let deleted = self
            .with_writer(|conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let deleted = match policy {
                    RetentionPolicy::KeepDays(days) => {
                        let cutoff = now
                            .checked_sub_signed(Duration::days(i64::from(days)))
                            .unwrap_or(DateTime::<Utc>::MIN_UTC);
                        tx.execute(
                            "DELETE FROM snapshots
                             WHERE timestamp < ?1
                               AND id NOT IN (SELECT snapshot_id FROM latest_pointer WHERE slot = 1)",
                            params![to_micros(cutoff)],
                        )?
                    }
                    RetentionPolicy::KeepLatest(keep) => {
                        let keep = i64::try_from(keep.max(1)).unwrap_or(i64::MAX);
                        tx.execute(
                            "DELETE FROM snapshots
                             WHERE id NOT IN (
                                SELECT id FROM snapshots
                                ORDER BY timestamp DESC, updated_at DESC, id ASC
                                LIMIT ?1
                             )
                               AND id NOT IN (SELECT snapshot_id FROM latest_pointer WHERE slot = 1)",
                            params![keep],
                        )?
                    }
                    RetentionPolicy::Wipe => {
                        let deleted = tx.execute("DELETE FROM snapshots", [])?;
                        recompute_latest_pointer(&tx)?;
                        deleted
                    }
                };
                tx.commit()?;
                Ok(deleted)
            })
            .await?;

        if deleted > 0 {
            debug!("Cleanup ({}) removed {} snapshot(s) from [{}]", policy, deleted, self.track);
        }
        Ok(deleted)
    }
}
