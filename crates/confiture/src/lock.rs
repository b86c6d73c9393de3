//! Lock Manager (spec §4.6): a session-scoped, cluster-wide PostgreSQL
//! advisory lock guarding an entire Migration Engine invocation.
//!
//! The lock key is a deterministic hash of the Tracking Store's qualified
//! name so unrelated projects sharing a cluster never collide, and two
//! invocations against the *same* tracking table always contend for the
//! same lock.

use std::time::Duration;

use tokio_postgres::Client;

use crate::error::{MigrationError, Result};

/// Derives the two `int4` halves of `pg_advisory_lock`'s bigint key from a
/// tracking table name, via a simple FNV-1a fold (no crypto properties
/// needed, just good collision behavior for a handful of distinct names).
fn lock_key(tracking_table: &str) -> i64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in tracking_table.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash as i64
}

/// Holds an advisory lock for the lifetime of the value; `release` is
/// idempotent and safe to call from a `Drop`-adjacent cleanup path as well
/// as explicitly on every exit, including error paths.
pub struct AdvisoryLock<'a> {
    client: &'a Client,
    key: i64,
    held: bool,
}

impl<'a> AdvisoryLock<'a> {
    /// Attempt a non-blocking lock first; on failure, poll until `timeout`
    /// elapses. Fails with `MigrationError::LockTimeout` if the lock is
    /// never acquired within the timeout.
    pub async fn acquire(
        client: &'a Client,
        tracking_table: &str,
        timeout: Duration,
    ) -> Result<AdvisoryLock<'a>> {
        let key = lock_key(tracking_table);

        let row = client
            .query_one("SELECT pg_try_advisory_lock($1)", &[&key])
            .await?;
        if row.get::<_, bool>(0) {
            return Ok(AdvisoryLock {
                client,
                key,
                held: true,
            });
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let poll_interval = Duration::from_millis(100);
        loop {
            if tokio::time::Instant::now() >= deadline {
                let competing = competing_session(client, key).await;
                return Err(MigrationError::LockTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                    competing,
                }
                .into());
            }
            tokio::time::sleep(poll_interval).await;
            let row = client
                .query_one("SELECT pg_try_advisory_lock($1)", &[&key])
                .await?;
            if row.get::<_, bool>(0) {
                return Ok(AdvisoryLock {
                    client,
                    key,
                    held: true,
                });
            }
        }
    }

    /// Release the lock. Safe to call more than once.
    pub async fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        self.client
            .query_one("SELECT pg_advisory_unlock($1)", &[&self.key])
            .await?;
        self.held = false;
        Ok(())
    }
}

/// Best-effort identification of the session currently holding `key`, for
/// diagnostics attached to a `LockTimeout` error.
async fn competing_session(client: &Client, key: i64) -> Option<String> {
    let rows = client
        .query(
            "SELECT pid, usename FROM pg_locks
             JOIN pg_stat_activity ON pg_stat_activity.pid = pg_locks.pid
             WHERE pg_locks.locktype = 'advisory' AND pg_locks.objid = $1
             LIMIT 1",
            &[&(key as i32)],
        )
        .await
        .ok()?;
    let row = rows.first()?;
    let pid: i32 = row.get(0);
    let user: Option<String> = row.get(1);
    Some(format!("pid {pid} ({})", user.unwrap_or_else(|| "unknown".into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_deterministic() {
        assert_eq!(lock_key("confiture.migrations"), lock_key("confiture.migrations"));
    }

    #[test]
    fn lock_key_differs_for_different_tables() {
        assert_ne!(lock_key("confiture.migrations"), lock_key("other.migrations"));
    }
}
