//! Dry-Run Analyzer (spec §4.8): statically classifies each statement of a
//! pending unit without executing it.
//!
//! Grounded in `original_source/core/dry_run.py`'s statement-shape
//! heuristics; reimplemented over `scanner::split_statements` so the same
//! statement boundaries the Migration Engine will actually execute are
//! what gets classified.

use crate::scanner;

/// Risk classification for one statement (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Classification {
    Safe,
    Warning,
    Unsafe,
}

/// Heuristic cost estimate for one statement. Duration/disk/cpu are
/// order-of-magnitude guesses derived from statement shape alone; callers
/// with a read-only connection may refine these via `EXPLAIN`, which this
/// analyzer does not itself perform.
#[derive(Debug, Clone, Default)]
pub struct CostEstimate {
    pub duration_ms: Option<u64>,
    pub disk_mb: Option<u64>,
    pub cpu_percent: Option<u8>,
}

/// Concurrency risk for one statement: which tables it is expected to
/// lock, how long it is likely to hold that lock, and an overall risk
/// level mirroring `classification` but scoped to lock contention alone.
#[derive(Debug, Clone)]
pub struct ConcurrencyRisk {
    pub tables_locked: Vec<String>,
    pub estimated_hold_ms: Option<u64>,
    pub risk_level: Classification,
}

/// Full analysis of one statement.
#[derive(Debug, Clone)]
pub struct StatementAnalysis {
    pub statement: String,
    pub classification: Classification,
    pub cost: CostEstimate,
    pub concurrency: ConcurrencyRisk,
}

/// A full dry-run report for one unit's up payload.
#[derive(Debug, Clone, Default)]
pub struct DryRunReport {
    pub statements: Vec<StatementAnalysis>,
}

impl DryRunReport {
    pub fn worst_classification(&self) -> Classification {
        self.statements
            .iter()
            .map(|s| s.classification)
            .max()
            .unwrap_or(Classification::Safe)
    }
}

/// Classify every statement in `sql`, in source order.
pub fn analyze(sql: &str) -> DryRunReport {
    let statements = scanner::split_statements(sql);
    let analyses = statements
        .into_iter()
        .map(|stmt| analyze_statement(&stmt))
        .collect();
    DryRunReport { statements: analyses }
}

fn analyze_statement(stmt: &str) -> StatementAnalysis {
    let upper = stmt.to_ascii_uppercase();
    let tables_locked = extract_table_names(&upper, stmt);

    let classification = classify(&upper);
    let cost = estimate_cost(&upper, classification);
    let concurrency = ConcurrencyRisk {
        tables_locked,
        estimated_hold_ms: cost.duration_ms,
        risk_level: classification,
    };

    StatementAnalysis {
        statement: stmt.to_string(),
        classification,
        cost,
        concurrency,
    }
}

fn classify(upper: &str) -> Classification {
    let trimmed = upper.trim_start();

    if trimmed.starts_with("DROP TABLE")
        || trimmed.starts_with("TRUNCATE")
        || contains_drop_column(trimmed)
    {
        return Classification::Unsafe;
    }
    if (trimmed.starts_with("DELETE") || trimmed.starts_with("UPDATE")) && !trimmed.contains("WHERE") {
        return Classification::Unsafe;
    }

    if trimmed.starts_with("VACUUM FULL") {
        return Classification::Warning;
    }
    if trimmed.starts_with("CREATE INDEX") && !trimmed.contains("CONCURRENTLY") {
        return Classification::Warning;
    }
    if trimmed.starts_with("ALTER TABLE") && rewrites_table(trimmed) {
        return Classification::Warning;
    }

    if trimmed.starts_with("SELECT")
        || trimmed.starts_with("CREATE TABLE IF NOT EXISTS")
        || (trimmed.starts_with("CREATE INDEX") && trimmed.contains("CONCURRENTLY"))
        || (trimmed.starts_with("ALTER TABLE") && adds_nullable_column(trimmed))
    {
        return Classification::Safe;
    }

    Classification::Warning
}

fn contains_drop_column(upper: &str) -> bool {
    upper.contains("DROP COLUMN")
}

fn rewrites_table(upper: &str) -> bool {
    upper.contains("ALTER COLUMN") && (upper.contains("TYPE") || upper.contains("USING"))
}

fn adds_nullable_column(upper: &str) -> bool {
    upper.contains("ADD COLUMN") && !upper.contains("NOT NULL")
}

fn estimate_cost(upper: &str, classification: Classification) -> CostEstimate {
    match classification {
        Classification::Safe => CostEstimate {
            duration_ms: Some(10),
            disk_mb: Some(0),
            cpu_percent: Some(1),
        },
        Classification::Warning => CostEstimate {
            duration_ms: Some(500),
            disk_mb: Some(1),
            cpu_percent: Some(10),
        },
        Classification::Unsafe => {
            let heavy = upper.contains("TRUNCATE") || upper.contains("DROP TABLE");
            CostEstimate {
                duration_ms: Some(if heavy { 2000 } else { 1000 }),
                disk_mb: Some(if heavy { 100 } else { 10 }),
                cpu_percent: Some(50),
            }
        }
    }
}

fn extract_table_names(upper: &str, original: &str) -> Vec<String> {
    for marker in ["TABLE", "INTO", "UPDATE", "FROM"] {
        if let Some(pos) = upper.find(marker) {
            let rest = original[pos + marker.len()..].trim_start();
            let name: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
                .collect();
            if !name.is_empty() {
                return vec![name];
            }
        }
    }
    Vec::new()
}
