//! Tracking Store (spec §4.5): the catalog-level record of which
//! MigrationUnits have been applied.
//!
//! All mutation happens inside the caller's transaction — the store never
//! opens its own transaction or commits — so the Migration Engine can wrap
//! a unit's tracking insert in the same savepoint discipline as its DDL.

use chrono::{DateTime, Utc};
use tokio_postgres::Transaction;

use crate::error::{MigrationError, Result};
use crate::identifier::{quote_qualified, validate};

/// One row of the tracking table, as recorded or read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRecord {
    pub version: String,
    pub name: String,
    pub applied_at: DateTime<Utc>,
    pub content_hash: String,
}

/// Talks to a single tracking table, identified by its (validated,
/// possibly schema-qualified) name.
pub struct TrackingStore {
    table: String,
}

impl TrackingStore {
    pub fn new(table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate(&table)?;
        Ok(TrackingStore { table })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Catalog lookup by (schema, base_name); does not require the table
    /// to be in the connection's search_path.
    pub async fn exists(&self, tx: &Transaction<'_>) -> Result<bool> {
        let (schema, table) = crate::identifier::split_qualified(&self.table);
        let row = tx
            .query_one(
                "SELECT EXISTS (
                     SELECT 1 FROM pg_class c
                     JOIN pg_namespace n ON n.oid = c.relnamespace
                     WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind = 'r'
                 )",
                &[&schema, &table],
            )
            .await?;
        Ok(row.get(0))
    }

    /// Create the table idempotently. Safe to call concurrently: relies on
    /// `CREATE TABLE IF NOT EXISTS`, not a prior existence check.
    pub async fn initialize(&self, tx: &Transaction<'_>) -> Result<()> {
        let qualified = quote_qualified(&self.table);
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {qualified} (
                 version text PRIMARY KEY,
                 name text NOT NULL,
                 applied_at timestamptz NOT NULL DEFAULT now(),
                 content_hash text NOT NULL
             )"
        );
        tx.batch_execute(&sql).await?;
        Ok(())
    }

    /// Ordered (by version) list of applied version strings.
    pub async fn applied_versions(&self, tx: &Transaction<'_>) -> Result<Vec<String>> {
        let qualified = quote_qualified(&self.table);
        let sql = format!("SELECT version FROM {qualified} ORDER BY version");
        match tx.query(&sql, &[]).await {
            Ok(rows) => Ok(rows.iter().map(|r| r.get(0)).collect()),
            Err(e) if is_undefined_table(&e) => Err(MigrationError::StoreUnavailable {
                table: self.table.clone(),
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Ordered (by version) list of full applied records.
    pub async fn applied_records(&self, tx: &Transaction<'_>) -> Result<Vec<AppliedRecord>> {
        let qualified = quote_qualified(&self.table);
        let sql = format!(
            "SELECT version, name, applied_at, content_hash FROM {qualified} ORDER BY version"
        );
        match tx.query(&sql, &[]).await {
            Ok(rows) => Ok(rows
                .iter()
                .map(|r| AppliedRecord {
                    version: r.get(0),
                    name: r.get(1),
                    applied_at: r.get(2),
                    content_hash: r.get(3),
                })
                .collect()),
            Err(e) if is_undefined_table(&e) => Err(MigrationError::StoreUnavailable {
                table: self.table.clone(),
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn record_applied(
        &self,
        tx: &Transaction<'_>,
        version: &str,
        name: &str,
        content_hash: &str,
    ) -> Result<()> {
        let qualified = quote_qualified(&self.table);
        let sql = format!(
            "INSERT INTO {qualified} (version, name, content_hash) VALUES ($1, $2, $3)"
        );
        tx.execute(&sql, &[&version, &name, &content_hash]).await?;
        Ok(())
    }

    pub async fn delete_applied(&self, tx: &Transaction<'_>, version: &str) -> Result<()> {
        let qualified = quote_qualified(&self.table);
        let sql = format!("DELETE FROM {qualified} WHERE version = $1");
        tx.execute(&sql, &[&version]).await?;
        Ok(())
    }

    /// Truncate the table. Used by Reinit and by the Rebuild Protocol.
    pub async fn truncate(&self, tx: &Transaction<'_>) -> Result<()> {
        let qualified = quote_qualified(&self.table);
        tx.batch_execute(&format!("TRUNCATE {qualified}")).await?;
        Ok(())
    }
}

fn is_undefined_table(e: &tokio_postgres::Error) -> bool {
    e.code() == Some(&tokio_postgres::error::SqlState::UNDEFINED_TABLE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_unsafe_identifiers() {
        assert!(TrackingStore::new("migrations; drop table users").is_err());
    }

    #[test]
    fn new_accepts_qualified_table() {
        let store = TrackingStore::new("confiture.migrations").unwrap();
        assert_eq!(store.table_name(), "confiture.migrations");
    }
}
