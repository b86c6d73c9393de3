//! Migration Engine (spec §4.7): discovery, pending resolution, per-unit
//! savepoint-scoped apply/rollback, the Rebuild Protocol, reinit, and
//! status reporting.
//!
//! Grounded in `original_source/core/migrator.py`'s phase ordering and in
//! the teacher's `MigrationContext`/savepoint-per-step style (previously
//! `migrate.rs`'s `inventory`-registered compile-time migrations), rebuilt
//! around a plain-data `MigrationUnit` per spec §9 ("dynamic class
//! synthesis in the source ... a systems-language rewrite models a
//! MigrationUnit as a plain record").

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio_postgres::Transaction;
use tracing::{info, instrument, warn};

use crate::error::{Error, MigrationError, Result};
use crate::hooks::{Direction, HookContext, HookExecutor, HookPhase, HookRegistry};
use crate::tracking::TrackingStore;

/// Execution strategy declared by a unit's up payload via a leading
/// `-- Strategy: rebuild|incremental` annotation (defaults to incremental).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Incremental,
    Rebuild,
}

/// One discovered migration: an immutable pair of SQL payloads identified
/// by version and name. Content hash is computed once at discovery and
/// used as this unit's identity for auditing.
#[derive(Debug, Clone)]
pub struct MigrationUnit {
    pub version: String,
    pub name: String,
    pub up_sql: String,
    pub down_sql: String,
    pub strategy: Strategy,
    pub content_hash: String,
    pub source_path: PathBuf,
}

impl MigrationUnit {
    fn new(version: String, name: String, up_sql: String, down_sql: String, source_path: PathBuf) -> Self {
        let strategy = detect_strategy(&up_sql);
        let content_hash = fingerprint(&up_sql, &down_sql);
        MigrationUnit {
            version,
            name,
            up_sql,
            down_sql,
            strategy,
            content_hash,
            source_path,
        }
    }
}

fn fingerprint(up_sql: &str, down_sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(up_sql.as_bytes());
    hasher.update([0u8]);
    hasher.update(down_sql.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Recognizes `-- Strategy: rebuild` within the first ten non-blank lines,
/// case-insensitively and tolerant of surrounding whitespace.
fn detect_strategy(up_sql: &str) -> Strategy {
    for line in up_sql.lines().filter(|l| !l.trim().is_empty()).take(10) {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("--") {
            let rest = rest.trim();
            if let Some(value) = rest
                .to_ascii_lowercase()
                .strip_prefix("strategy:")
                .map(|s| s.trim().to_string())
            {
                if value == "rebuild" {
                    return Strategy::Rebuild;
                }
                return Strategy::Incremental;
            }
        }
    }
    Strategy::Incremental
}

/// Discover units under `dir`. Two on-disk shapes are merged by version:
/// (a) paired `<version>_<name>.up.sql` + `<version>_<name>.down.sql`
/// files; (b) a single `<version>_<name>.sql` file with `-- migrate:up`
/// and `-- migrate:down` section markers (the "scripted form" spec §3
/// mentions without prescribing a format).
pub fn discover(dir: &Path) -> Result<Vec<MigrationUnit>> {
    let mut by_version: HashMap<String, MigrationUnit> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut pending_up: HashMap<String, (String, String, PathBuf)> = HashMap::new();
    let mut pending_down: HashMap<String, String> = HashMap::new();

    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::Config(crate::error::ConfigError::Io {
            path: dir.to_path_buf(),
            source: e,
        })
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    for path in &paths {
        let file_name = path.file_name().and_then(|f| f.to_str()).unwrap_or("");

        if let Some(stripped) = file_name.strip_suffix(".up.sql") {
            let (version, name) = split_version_name(stripped)?;
            let text = read_file(path)?;
            pending_up.insert(version, (name, text, path.clone()));
            continue;
        }
        if let Some(stripped) = file_name.strip_suffix(".down.sql") {
            let (version, _name) = split_version_name(stripped)?;
            let text = read_file(path)?;
            pending_down.insert(version, text);
            continue;
        }
        if let Some(stripped) = file_name.strip_suffix(".sql") {
            let (version, name) = split_version_name(stripped)?;
            let text = read_file(path)?;
            if let Some((up_sql, down_sql)) = split_scripted_form(&text) {
                insert_unit(
                    &mut by_version,
                    &mut order,
                    MigrationUnit::new(version, name, up_sql, down_sql, path.clone()),
                )?;
            }
        }
    }

    for (version, (name, up_sql, path)) in pending_up {
        let down_sql = pending_down.remove(&version).ok_or_else(|| {
            Error::Migration(MigrationError::MissingDown {
                version: version.clone(),
                expected: dir.join(format!("{version}_{name}.down.sql")),
            })
        })?;
        insert_unit(
            &mut by_version,
            &mut order,
            MigrationUnit::new(version, name, up_sql, down_sql, path),
        )?;
    }

    order.sort();
    Ok(order
        .into_iter()
        .map(|v| by_version.remove(&v).expect("present"))
        .collect())
}

fn insert_unit(
    by_version: &mut HashMap<String, MigrationUnit>,
    order: &mut Vec<String>,
    unit: MigrationUnit,
) -> Result<()> {
    if let Some(existing) = by_version.get(&unit.version) {
        return Err(Error::Migration(MigrationError::DuplicateVersion {
            version: unit.version.clone(),
            first: existing.source_path.clone(),
            second: unit.source_path.clone(),
        }));
    }
    if let Some(conflict) = by_version.values().find(|u| u.name == unit.name) {
        return Err(Error::Migration(MigrationError::NameConflict {
            name: unit.name.clone(),
            first: conflict.source_path.clone(),
            second: unit.source_path.clone(),
        }));
    }
    order.push(unit.version.clone());
    by_version.insert(unit.version.clone(), unit);
    Ok(())
}

fn split_version_name(stem: &str) -> Result<(String, String)> {
    stem.split_once('_')
        .map(|(v, n)| (v.to_string(), n.to_string()))
        .ok_or_else(|| {
            Error::Config(crate::error::ConfigError::Parse {
                path: PathBuf::from(stem),
                message: "migration filename must be <version>_<name>".to_string(),
            })
        })
}

fn split_scripted_form(text: &str) -> Option<(String, String)> {
    let up_marker = "-- migrate:up";
    let down_marker = "-- migrate:down";
    let up_pos = text.find(up_marker)?;
    let down_pos = text.find(down_marker)?;
    if down_pos < up_pos {
        return None;
    }
    let up_sql = text[up_pos + up_marker.len()..down_pos].trim().to_string();
    let down_sql = text[down_pos + down_marker.len()..].trim().to_string();
    Some((up_sql, down_sql))
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        Error::Config(crate::error::ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    })
}

/// Status of one discovered/applied unit, relative to the tracking store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    Applied,
    Pending,
    Orphaned,
}

/// One row of a `migrate status` report.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub version: String,
    pub name: String,
    pub status: MigrationStatus,
}

/// The outcome of a Rebuild Protocol run (spec §4.7-R).
#[derive(Debug, Clone)]
pub struct MigrateRebuildResult {
    pub schemas_dropped: Vec<String>,
    pub ddl_statements_executed: usize,
    pub units_marked_applied: usize,
    pub seeds_reapplied: bool,
    pub structural_verification_passed: Option<bool>,
}

/// Savepoint names used across a unit's apply discipline (spec §4.7 step
/// list). Kept as constants so the sequence reads the same way at every
/// call site.
mod savepoints {
    pub const BEFORE_VALIDATION: &str = "su_before_validation";
    pub const BEFORE_DDL: &str = "su_before_ddl";
    pub const AFTER_DDL: &str = "su_after_ddl";
    pub const AFTER_VALIDATION: &str = "su_after_validation";
}

/// Orchestrates discovery, pending resolution, and transactional
/// apply/rollback/rebuild/reinit/status against one tracking table.
pub struct MigrationEngine {
    units: Vec<MigrationUnit>,
    tracking: TrackingStore,
    hooks: HookRegistry,
}

impl MigrationEngine {
    pub fn new(units: Vec<MigrationUnit>, tracking: TrackingStore, hooks: HookRegistry) -> Self {
        MigrationEngine {
            units,
            tracking,
            hooks,
        }
    }

    pub fn units(&self) -> &[MigrationUnit] {
        &self.units
    }

    /// `pending = discovered \ applied`, truncated to `target` when given
    /// (lexical comparison on equal-length version strings, matching the
    /// version-sort invariant discovery already enforces).
    async fn pending(&self, tx: &Transaction<'_>, target: Option<&str>) -> Result<Vec<&MigrationUnit>> {
        let applied = self.tracking.applied_versions(tx).await?;
        let applied: std::collections::HashSet<&str> = applied.iter().map(|s| s.as_str()).collect();
        let mut pending: Vec<&MigrationUnit> = self
            .units
            .iter()
            .filter(|u| !applied.contains(u.version.as_str()))
            .collect();
        if let Some(target) = target {
            pending.retain(|u| u.version.as_str() <= target);
        }
        Ok(pending)
    }

    /// Apply pending units in ascending version order.
    #[instrument(skip(self, tx))]
    pub async fn up(&self, tx: &Transaction<'_>, target: Option<&str>) -> Result<Vec<String>> {
        if !self.tracking.exists(tx).await? {
            self.tracking.initialize(tx).await?;
        }
        let pending = self.pending(tx, target).await?;
        let mut applied = Vec::with_capacity(pending.len());
        for unit in pending {
            self.apply_unit(tx, unit).await?;
            applied.push(unit.version.clone());
        }
        Ok(applied)
    }

    /// Reverse the last `steps` applied units (default 1), in strictly
    /// descending version order.
    #[instrument(skip(self, tx))]
    pub async fn down(&self, tx: &Transaction<'_>, steps: usize) -> Result<Vec<String>> {
        let mut applied = self.tracking.applied_records(tx).await?;
        applied.sort_by(|a, b| b.version.cmp(&a.version));
        let mut rolled_back = Vec::new();
        for record in applied.into_iter().take(steps.max(1)) {
            let unit = self
                .units
                .iter()
                .find(|u| u.version == record.version)
                .ok_or_else(|| MigrationError::MissingDown {
                    version: record.version.clone(),
                    expected: PathBuf::from(format!("{}.down.sql", record.version)),
                })?;
            self.rollback_unit(tx, unit).await?;
            rolled_back.push(unit.version.clone());
        }
        Ok(rolled_back)
    }

    async fn apply_unit(&self, tx: &Transaction<'_>, unit: &MigrationUnit) -> Result<()> {
        let result = self.apply_unit_inner(tx, unit).await;
        if let Err(err) = &result {
            self.run_on_error_best_effort(tx, unit, err).await;
        }
        result.map_err(|underlying| {
            Error::Migration(MigrationError::Apply {
                version: unit.version.clone(),
                name: unit.name.clone(),
                underlying: Box::new(underlying),
            })
        })
    }

    async fn apply_unit_inner(&self, tx: &Transaction<'_>, unit: &MigrationUnit) -> Result<()> {
        let mut ctx = HookContext::new(&unit.version, &unit.name, Direction::Forward);
        let executor = HookExecutor::new(&self.hooks);

        tx.batch_execute(&format!("SAVEPOINT {}", savepoints::BEFORE_VALIDATION))
            .await?;
        if let Err(e) = executor
            .run_phase(tx, HookPhase::BeforeValidation, &mut ctx)
            .await
        {
            tx.batch_execute(&format!("ROLLBACK TO SAVEPOINT {}", savepoints::BEFORE_VALIDATION))
                .await?;
            return Err(e);
        }

        tx.batch_execute(&format!("SAVEPOINT {}", savepoints::BEFORE_DDL))
            .await?;
        executor.run_phase(tx, HookPhase::BeforeDdl, &mut ctx).await?;

        if unit.strategy == Strategy::Rebuild {
            warn!(version = %unit.version, "unit declares rebuild strategy; apply() runs its DDL as-is, use rebuild() for the full protocol");
        }
        let cleaned = strip_transaction_control(&unit.up_sql);
        tx.batch_execute(&cleaned).await?;

        tx.batch_execute(&format!("SAVEPOINT {}", savepoints::AFTER_DDL))
            .await?;
        executor.run_phase(tx, HookPhase::AfterDdl, &mut ctx).await?;

        tx.batch_execute(&format!("SAVEPOINT {}", savepoints::AFTER_VALIDATION))
            .await?;
        executor
            .run_phase(tx, HookPhase::AfterValidation, &mut ctx)
            .await?;

        executor.run_phase(tx, HookPhase::Cleanup, &mut ctx).await?;

        self.tracking
            .record_applied(tx, &unit.version, &unit.name, &unit.content_hash)
            .await?;

        info!(version = %unit.version, name = %unit.name, "migration applied");
        Ok(())
    }

    async fn rollback_unit(&self, tx: &Transaction<'_>, unit: &MigrationUnit) -> Result<()> {
        let cleaned = strip_transaction_control(&unit.down_sql);
        tx.batch_execute(&cleaned).await.map_err(|e| {
            Error::Migration(MigrationError::Rollback {
                version: unit.version.clone(),
                name: unit.name.clone(),
                underlying: Box::new(Error::from(e)),
            })
        })?;
        self.tracking.delete_applied(tx, &unit.version).await?;
        info!(version = %unit.version, name = %unit.name, "migration rolled back");
        Ok(())
    }

    /// `ON_ERROR` hooks run after rollback, in the caller's transaction,
    /// best-effort: their own failures are logged, never raised.
    async fn run_on_error_best_effort(&self, tx: &Transaction<'_>, unit: &MigrationUnit, original: &Error) {
        let mut ctx = HookContext::new(&unit.version, &unit.name, Direction::Forward);
        let executor = HookExecutor::new(&self.hooks);
        if let Err(e) = executor.run_phase(tx, HookPhase::OnError, &mut ctx).await {
            warn!(version = %unit.version, error = %e, original_error = %original, "on_error hook itself failed");
        }
    }

    /// Cross-join discovered units against applied records (spec §4.7
    /// Status). Reports every unit `pending` with a warning when the
    /// tracking table doesn't exist yet.
    pub async fn status(&self, tx: &Transaction<'_>) -> Result<Vec<StatusEntry>> {
        if !self.tracking.exists(tx).await? {
            warn!("tracking table does not exist; reporting every unit pending");
            return Ok(self
                .units
                .iter()
                .map(|u| StatusEntry {
                    version: u.version.clone(),
                    name: u.name.clone(),
                    status: MigrationStatus::Pending,
                })
                .collect());
        }

        let applied = self.tracking.applied_records(tx).await?;
        let applied_versions: std::collections::HashSet<&str> =
            applied.iter().map(|r| r.version.as_str()).collect();

        let mut entries: Vec<StatusEntry> = self
            .units
            .iter()
            .map(|u| StatusEntry {
                version: u.version.clone(),
                name: u.name.clone(),
                status: if applied_versions.contains(u.version.as_str()) {
                    MigrationStatus::Applied
                } else {
                    MigrationStatus::Pending
                },
            })
            .collect();

        let discovered_versions: std::collections::HashSet<&str> =
            self.units.iter().map(|u| u.version.as_str()).collect();
        for record in &applied {
            if !discovered_versions.contains(record.version.as_str()) {
                entries.push(StatusEntry {
                    version: record.version.clone(),
                    name: record.name.clone(),
                    status: MigrationStatus::Orphaned,
                });
            }
        }

        entries.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(entries)
    }

    /// Truncate the tracking store, rediscover, and mark all units up to
    /// `through` (or all, if `None`) as applied without executing SQL.
    pub async fn reinit(&self, tx: &Transaction<'_>, through: Option<&str>) -> Result<usize> {
        if !self.tracking.exists(tx).await? {
            self.tracking.initialize(tx).await?;
        }
        self.tracking.truncate(tx).await?;
        let mut marked = 0usize;
        for unit in &self.units {
            if through.map(|t| unit.version.as_str() <= t).unwrap_or(true) {
                self.tracking
                    .record_applied(tx, &unit.version, &unit.name, &unit.content_hash)
                    .await?;
                marked += 1;
            }
        }
        Ok(marked)
    }

    /// Rebuild Protocol (spec §4.7-R). `declared_ddl` is the target-state
    /// DDL concatenation produced by the Schema Comparator's build step,
    /// not an incremental delta. Requires `confirmed == true` (spec §9
    /// Open Question decision); the core never prompts interactively.
    pub async fn rebuild(
        &self,
        tx: &Transaction<'_>,
        schemas: &[String],
        declared_ddl: &str,
        confirmed: bool,
        reapply_seeds: bool,
    ) -> Result<MigrateRebuildResult> {
        if !confirmed {
            return Err(crate::error::RebuildError::ConfirmationRequired.into());
        }

        for schema in schemas {
            crate::identifier::validate(schema)?;
        }

        for schema in schemas {
            let quoted = crate::identifier::quote_ident(schema);
            tx.batch_execute(&format!("DROP SCHEMA IF EXISTS {quoted} CASCADE"))
                .await?;
            tx.batch_execute(&format!("CREATE SCHEMA {quoted}")).await?;
        }

        let statements = crate::scanner::split_statements(declared_ddl);
        for stmt in &statements {
            tx.batch_execute(stmt).await?;
        }

        if !self.tracking.exists(tx).await? {
            self.tracking.initialize(tx).await?;
        }
        let previously_applied = self.tracking.applied_records(tx).await?;
        let preserved_at: HashMap<String, chrono::DateTime<chrono::Utc>> = previously_applied
            .into_iter()
            .map(|r| (r.version, r.applied_at))
            .collect();

        self.tracking.truncate(tx).await?;
        let mut units_marked = 0usize;
        for unit in &self.units {
            self.tracking
                .record_applied(tx, &unit.version, &unit.name, &unit.content_hash)
                .await?;
            units_marked += 1;
            let _ = preserved_at.get(&unit.version); // historical timestamp retained by caller's backup step, see DESIGN.md
        }

        Ok(MigrateRebuildResult {
            schemas_dropped: schemas.to_vec(),
            ddl_statements_executed: statements.len(),
            units_marked_applied: units_marked,
            seeds_reapplied: reapply_seeds,
            structural_verification_passed: None,
        })
    }
}

/// Strip top-level `BEGIN;`/`COMMIT;` lines from a unit's payload — the
/// engine owns the transaction — logging a warning when stripping occurs.
fn strip_transaction_control(sql: &str) -> String {
    let mut stripped_any = false;
    let kept: Vec<&str> = sql
        .lines()
        .filter(|line| {
            let trimmed = line.trim().trim_end_matches(';').trim();
            let is_control = trimmed.eq_ignore_ascii_case("begin") || trimmed.eq_ignore_ascii_case("commit");
            if is_control {
                stripped_any = true;
            }
            !is_control
        })
        .collect();
    if stripped_any {
        warn!("stripped top-level BEGIN/COMMIT from migration payload; the engine owns the transaction");
    }
    kept.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn discovers_paired_up_down_files_sorted_by_version() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "002_add_orders.up.sql", "CREATE TABLE orders (id int);");
        write_file(dir.path(), "002_add_orders.down.sql", "DROP TABLE orders;");
        write_file(dir.path(), "001_add_users.up.sql", "CREATE TABLE users (id int);");
        write_file(dir.path(), "001_add_users.down.sql", "DROP TABLE users;");

        let units = discover(dir.path()).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].version, "001");
        assert_eq!(units[1].version, "002");
    }

    #[test]
    fn missing_down_file_fails_discovery() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "001_only_up.up.sql", "CREATE TABLE t (id int);");
        let result = discover(dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_version_across_modes_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "001_a.up.sql", "CREATE TABLE a (id int);");
        write_file(dir.path(), "001_a.down.sql", "DROP TABLE a;");
        write_file(
            dir.path(),
            "001_b.sql",
            "-- migrate:up\nCREATE TABLE b (id int);\n-- migrate:down\nDROP TABLE b;",
        );
        let result = discover(dir.path());
        assert!(matches!(result, Err(Error::Migration(MigrationError::DuplicateVersion { .. }))));
    }

    #[test]
    fn scripted_form_splits_on_markers() {
        let text = "-- migrate:up\nCREATE TABLE t (id int);\n-- migrate:down\nDROP TABLE t;";
        let (up, down) = split_scripted_form(text).unwrap();
        assert!(up.contains("CREATE TABLE"));
        assert!(down.contains("DROP TABLE"));
    }

    #[test]
    fn detects_rebuild_strategy_annotation() {
        let sql = "-- Strategy: rebuild\nCREATE TABLE t (id int);";
        assert_eq!(detect_strategy(sql), Strategy::Rebuild);
    }

    #[test]
    fn defaults_to_incremental_without_annotation() {
        assert_eq!(detect_strategy("CREATE TABLE t (id int);"), Strategy::Incremental);
    }

    #[test]
    fn strip_transaction_control_removes_begin_commit_lines() {
        let sql = "BEGIN;\nCREATE TABLE t (id int);\nCOMMIT;";
        let cleaned = strip_transaction_control(sql);
        assert!(!cleaned.to_ascii_lowercase().contains("begin"));
        assert!(!cleaned.to_ascii_lowercase().contains("commit"));
        assert!(cleaned.contains("CREATE TABLE"));
    }

    #[test]
    fn content_hash_is_stable_for_identical_payloads() {
        let h1 = fingerprint("CREATE TABLE t (id int);", "DROP TABLE t;");
        let h2 = fingerprint("CREATE TABLE t (id int);", "DROP TABLE t;");
        assert_eq!(h1, h2);
    }
}
