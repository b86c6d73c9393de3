//! Seed Validator (spec §4.10): a pure function `(seed_data, schema_context)
//! -> ValidationReport`, composing a fixed-order chain of small detectors
//! that each walk the parsed seed rows and accumulate violations.
//!
//! Grounded in the orchestrator shape of
//! `original_source/core/seed_validation/*` (one detector per concern,
//! run in a fixed order by a single entry point) and in `seed::pattern`
//! for the `INVALID_IDENTIFIER_PATTERN` check.

use indexmap::IndexMap;

use crate::model::{PatternTag, SchemaContext};
use crate::seed::pattern;

/// One row of seed data: column name to its literal value (`None` = SQL
/// `NULL`, never an empty string or `"0"`/`"false"`).
pub type SeedRow = IndexMap<String, Option<String>>;

/// One `INSERT ... SELECT ... UNION [ALL] SELECT ...` statement's
/// positional branch values, as extracted by
/// `seed::copy::extract_union_branches`.
#[derive(Debug, Clone)]
pub struct UnionGroup {
    pub table: String,
    pub branches: Vec<Vec<Option<String>>>,
}

/// Seed data grouped by table, in file order.
#[derive(Debug, Clone, Default)]
pub struct SeedData {
    pub tables: IndexMap<String, Vec<SeedRow>>,
    pub union_groups: Vec<UnionGroup>,
}

impl SeedData {
    pub fn new() -> Self {
        SeedData::default()
    }

    pub fn insert_row(&mut self, table: &str, row: SeedRow) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    pub fn push_union_group(&mut self, table: &str, branches: Vec<Vec<Option<String>>>) {
        self.union_groups.push(UnionGroup {
            table: table.to_string(),
            branches,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    MissingRequiredTable,
    TableTooSmall { actual: usize, min_rows: usize },
    NullInRequiredColumn,
    DuplicateInUniqueColumn,
    FkReferentMissing { to_table: String, to_column: String },
    InvalidIdentifierPattern,
    UnionNullTypeMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub table: String,
    pub column: Option<String>,
    pub row_index: Option<usize>,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub message: String,
}

/// Per-file identifier-pattern context (spec §4.10-R): the schema entity
/// and directory codes derived once from the seed file's path, supplied by
/// the caller rather than recomputed per row.
#[derive(Debug, Clone, Default)]
pub struct PatternContext {
    pub schema_entity: String,
    pub directory: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == Severity::Error)
    }
}

/// Validate `seed_data` against `schema_context`, running detectors in a
/// fixed order and accumulating violations. Stops after the first
/// violation when `stop_on_first` is set.
pub fn validate(
    seed_data: &SeedData,
    schema_context: &SchemaContext,
    pattern_ctx: &PatternContext,
    stop_on_first: bool,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    let detectors: [fn(&SeedData, &SchemaContext, &PatternContext, &mut Vec<Violation>); 7] = [
        detect_missing_required_tables,
        detect_table_too_small,
        detect_null_in_required_columns,
        detect_duplicate_unique_columns,
        detect_fk_referent_missing,
        detect_invalid_identifier_pattern,
        detect_union_null_type_mismatch,
    ];

    for detector in detectors {
        let mut found = Vec::new();
        detector(seed_data, schema_context, pattern_ctx, &mut found);
        let should_stop = stop_on_first && !found.is_empty();
        report.violations.extend(found);
        if should_stop {
            break;
        }
    }

    report
}

fn is_null_like(value: &Option<String>) -> bool {
    value.is_none()
}

fn detect_missing_required_tables(
    seed_data: &SeedData,
    ctx: &SchemaContext,
    _pattern_ctx: &PatternContext,
    out: &mut Vec<Violation>,
) {
    for (table, table_ctx) in &ctx.tables {
        if table_ctx.required && !seed_data.tables.contains_key(table) {
            out.push(Violation {
                table: table.clone(),
                column: None,
                row_index: None,
                kind: ViolationKind::MissingRequiredTable,
                severity: Severity::Error,
                message: format!("required table {table:?} is absent from seed data"),
            });
        }
    }
}

fn detect_table_too_small(
    seed_data: &SeedData,
    ctx: &SchemaContext,
    _pattern_ctx: &PatternContext,
    out: &mut Vec<Violation>,
) {
    for (table, table_ctx) in &ctx.tables {
        let Some(min_rows) = table_ctx.min_rows else {
            continue;
        };
        let actual = seed_data.tables.get(table).map(|rows| rows.len()).unwrap_or(0);
        if actual < min_rows {
            out.push(Violation {
                table: table.clone(),
                column: None,
                row_index: None,
                kind: ViolationKind::TableTooSmall { actual, min_rows },
                severity: Severity::Error,
                message: format!(
                    "table {table:?} has {actual} row(s), expected at least {min_rows}"
                ),
            });
        }
    }
}

fn detect_null_in_required_columns(
    seed_data: &SeedData,
    ctx: &SchemaContext,
    _pattern_ctx: &PatternContext,
    out: &mut Vec<Violation>,
) {
    for (table, table_ctx) in &ctx.tables {
        let Some(rows) = seed_data.tables.get(table) else {
            continue;
        };
        for (column, col_ctx) in &table_ctx.columns {
            if !col_ctx.required {
                continue;
            }
            for (row_index, row) in rows.iter().enumerate() {
                let is_null = match row.get(column) {
                    None => true,
                    Some(v) => is_null_like(v),
                };
                if is_null {
                    out.push(Violation {
                        table: table.clone(),
                        column: Some(column.clone()),
                        row_index: Some(row_index),
                        kind: ViolationKind::NullInRequiredColumn,
                        severity: Severity::Error,
                        message: format!(
                            "row {row_index} of {table:?} has NULL in required column {column:?}"
                        ),
                    });
                }
            }
        }
    }
}

fn detect_duplicate_unique_columns(
    seed_data: &SeedData,
    ctx: &SchemaContext,
    _pattern_ctx: &PatternContext,
    out: &mut Vec<Violation>,
) {
    for (table, table_ctx) in &ctx.tables {
        let Some(rows) = seed_data.tables.get(table) else {
            continue;
        };
        for (column, col_ctx) in &table_ctx.columns {
            if !col_ctx.unique {
                continue;
            }
            let mut seen: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
            for (row_index, row) in rows.iter().enumerate() {
                let Some(Some(value)) = row.get(column) else {
                    continue;
                };
                if let Some(first_index) = seen.insert(value.as_str(), row_index) {
                    out.push(Violation {
                        table: table.clone(),
                        column: Some(column.clone()),
                        row_index: Some(row_index),
                        kind: ViolationKind::DuplicateInUniqueColumn,
                        severity: Severity::Error,
                        message: format!(
                            "value {value:?} in unique column {table}.{column} appears at rows {first_index} and {row_index}"
                        ),
                    });
                }
            }
        }
    }
}

fn detect_fk_referent_missing(
    seed_data: &SeedData,
    ctx: &SchemaContext,
    _pattern_ctx: &PatternContext,
    out: &mut Vec<Violation>,
) {
    for (table, table_ctx) in &ctx.tables {
        let Some(rows) = seed_data.tables.get(table) else {
            continue;
        };
        for (column, col_ctx) in &table_ctx.columns {
            let Some((to_table, to_column)) = &col_ctx.foreign_key else {
                continue;
            };
            let referents: std::collections::HashSet<&str> = seed_data
                .tables
                .get(to_table)
                .map(|rows| {
                    rows.iter()
                        .filter_map(|r| r.get(to_column).and_then(|v| v.as_deref()))
                        .collect()
                })
                .unwrap_or_default();

            for (row_index, row) in rows.iter().enumerate() {
                let Some(Some(value)) = row.get(column) else {
                    continue;
                };
                if !referents.contains(value.as_str()) {
                    out.push(Violation {
                        table: table.clone(),
                        column: Some(column.clone()),
                        row_index: Some(row_index),
                        kind: ViolationKind::FkReferentMissing {
                            to_table: to_table.clone(),
                            to_column: to_column.clone(),
                        },
                        severity: Severity::Error,
                        message: format!(
                            "{table}.{column} row {row_index} references {to_table}.{to_column} = {value:?}, no such row in seed data"
                        ),
                    });
                }
            }
        }
    }
}

fn detect_invalid_identifier_pattern(
    seed_data: &SeedData,
    ctx: &SchemaContext,
    pattern_ctx: &PatternContext,
    out: &mut Vec<Violation>,
) {
    for (table, table_ctx) in &ctx.tables {
        let Some(rows) = seed_data.tables.get(table) else {
            continue;
        };
        for (column, col_ctx) in &table_ctx.columns {
            let Some(tag) = col_ctx.pattern else {
                continue;
            };
            for (row_index, row) in rows.iter().enumerate() {
                let Some(Some(value)) = row.get(column) else {
                    continue;
                };
                let ok = match tag {
                    PatternTag::Enumerated => pattern::is_enumerated(
                        value,
                        &pattern_ctx.schema_entity,
                        &pattern_ctx.directory,
                    ),
                    PatternTag::TestPlaceholder => pattern::is_test_placeholder(value),
                    PatternTag::EitherPattern => pattern::matches_any(
                        value,
                        &pattern_ctx.schema_entity,
                        &pattern_ctx.directory,
                    ),
                };
                if !ok {
                    out.push(Violation {
                        table: table.clone(),
                        column: Some(column.clone()),
                        row_index: Some(row_index),
                        kind: ViolationKind::InvalidIdentifierPattern,
                        severity: Severity::Error,
                        message: format!(
                            "{table}.{column} row {row_index} value {value:?} matches neither enumerated nor test-placeholder identifier pattern"
                        ),
                    });
                }
            }
        }
    }
}

/// Detects `NULL` (untyped) in position *i* of one UNION branch alongside
/// `NULL::type` (or a non-null expression) in the same position of another
/// branch, or branches with mismatched column counts. Operates on raw
/// per-branch value text rather than on a flattened `SeedData` row, since
/// this is a statement-shape check: `seed::copy::extract_union_branches`
/// collects the branches per `UnionGroup` up front.
pub fn check_union_null_type_consistency(branches: &[Vec<Option<String>>]) -> Vec<usize> {
    let mut mismatched_positions = Vec::new();
    let Some(width) = branches.first().map(|b| b.len()) else {
        return mismatched_positions;
    };
    if branches.iter().any(|b| b.len() != width) {
        return (0..width).collect();
    }
    for pos in 0..width {
        let mut saw_untyped_null = false;
        let mut saw_typed_or_value = false;
        for branch in branches {
            match &branch[pos] {
                None => saw_untyped_null = true,
                Some(v) if v.eq_ignore_ascii_case("null") => saw_untyped_null = true,
                Some(v) if v.to_ascii_uppercase().starts_with("NULL::") => saw_typed_or_value = true,
                Some(_) => saw_typed_or_value = true,
            }
        }
        if saw_untyped_null && saw_typed_or_value {
            mismatched_positions.push(pos);
        }
    }
    mismatched_positions
}

fn detect_union_null_type_mismatch(
    seed_data: &SeedData,
    _ctx: &SchemaContext,
    _pattern_ctx: &PatternContext,
    out: &mut Vec<Violation>,
) {
    for group in &seed_data.union_groups {
        for pos in check_union_null_type_consistency(&group.branches) {
            out.push(Violation {
                table: group.table.clone(),
                column: Some(format!("position {pos}")),
                row_index: None,
                kind: ViolationKind::UnionNullTypeMismatch,
                severity: Severity::Error,
                message: format!(
                    "{}'s UNION statement has inconsistent NULL typing at column position {pos}: one branch has an untyped NULL while another has NULL::type or a value",
                    group.table
                ),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnContext, TableContext};

    fn row(pairs: &[(&str, Option<&str>)]) -> SeedRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(|s| s.to_string())))
            .collect()
    }

    #[test]
    fn missing_required_table_is_flagged() {
        let mut ctx = SchemaContext::default();
        ctx.tables.insert(
            "users".to_string(),
            TableContext {
                required: true,
                ..Default::default()
            },
        );
        let data = SeedData::new();
        let report = validate(&data, &ctx, &PatternContext::default(), false);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].kind, ViolationKind::MissingRequiredTable);
    }

    #[test]
    fn table_too_small_is_flagged() {
        let mut ctx = SchemaContext::default();
        ctx.tables.insert(
            "users".to_string(),
            TableContext {
                min_rows: Some(2),
                ..Default::default()
            },
        );
        let mut data = SeedData::new();
        data.insert_row("users", row(&[("id", Some("1"))]));
        let report = validate(&data, &ctx, &PatternContext::default(), false);
        assert!(matches!(
            report.violations[0].kind,
            ViolationKind::TableTooSmall { actual: 1, min_rows: 2 }
        ));
    }

    #[test]
    fn null_in_required_column_is_flagged() {
        let mut ctx = SchemaContext::default();
        let mut table_ctx = TableContext::default();
        table_ctx.columns.insert(
            "email".to_string(),
            ColumnContext {
                required: true,
                ..Default::default()
            },
        );
        ctx.tables.insert("users".to_string(), table_ctx);
        let mut data = SeedData::new();
        data.insert_row("users", row(&[("email", None)]));
        let report = validate(&data, &ctx, &PatternContext::default(), false);
        assert_eq!(report.violations[0].kind, ViolationKind::NullInRequiredColumn);
    }

    #[test]
    fn duplicate_unique_value_is_flagged() {
        let mut ctx = SchemaContext::default();
        let mut table_ctx = TableContext::default();
        table_ctx.columns.insert(
            "email".to_string(),
            ColumnContext {
                unique: true,
                ..Default::default()
            },
        );
        ctx.tables.insert("users".to_string(), table_ctx);
        let mut data = SeedData::new();
        data.insert_row("users", row(&[("email", Some("a@example.com"))]));
        data.insert_row("users", row(&[("email", Some("a@example.com"))]));
        let report = validate(&data, &ctx, &PatternContext::default(), false);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].kind, ViolationKind::DuplicateInUniqueColumn);
    }

    #[test]
    fn fk_referent_missing_is_flagged() {
        let mut ctx = SchemaContext::default();
        let mut orders_ctx = TableContext::default();
        orders_ctx.columns.insert(
            "customer_id".to_string(),
            ColumnContext {
                foreign_key: Some(("users".to_string(), "id".to_string())),
                ..Default::default()
            },
        );
        ctx.tables.insert("orders".to_string(), orders_ctx);

        let mut data = SeedData::new();
        data.insert_row("users", row(&[("id", Some("1"))]));
        data.insert_row(
            "orders",
            row(&[("id", Some("1")), ("customer_id", Some("999"))]),
        );

        let report = validate(&data, &ctx, &PatternContext::default(), false);
        assert_eq!(report.violations.len(), 1);
        assert!(matches!(
            &report.violations[0].kind,
            ViolationKind::FkReferentMissing { to_table, to_column }
                if to_table == "users" && to_column == "id"
        ));
    }

    #[test]
    fn stop_on_first_halts_after_first_detector_with_hits() {
        let mut ctx = SchemaContext::default();
        ctx.tables.insert(
            "a".to_string(),
            TableContext {
                required: true,
                ..Default::default()
            },
        );
        ctx.tables.insert(
            "b".to_string(),
            TableContext {
                required: true,
                ..Default::default()
            },
        );
        let data = SeedData::new();
        let report = validate(&data, &ctx, &PatternContext::default(), true);
        assert_eq!(report.violations.len(), 2);
    }

    #[test]
    fn union_null_mismatch_flags_position_with_typed_and_untyped_null() {
        let branches = vec![
            vec![Some("1".to_string()), None],
            vec![Some("2".to_string()), Some("NULL::text".to_string())],
        ];
        let positions = check_union_null_type_consistency(&branches);
        assert_eq!(positions, vec![1]);
    }

    #[test]
    fn union_branches_with_mismatched_arity_flag_all_positions() {
        let branches = vec![
            vec![Some("1".to_string())],
            vec![Some("2".to_string()), Some("3".to_string())],
        ];
        let positions = check_union_null_type_consistency(&branches);
        assert_eq!(positions, vec![0, 1]);
    }

    #[test]
    fn validate_surfaces_a_real_union_null_type_mismatch_violation() {
        let mut data = SeedData::new();
        data.push_union_group(
            "accounts",
            vec![
                vec![Some("1".to_string()), None],
                vec![Some("2".to_string()), Some("NULL::text".to_string())],
            ],
        );
        let report = validate(&data, &SchemaContext::default(), &PatternContext::default(), false);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].kind, ViolationKind::UnionNullTypeMismatch);
        assert_eq!(report.violations[0].table, "accounts");
        assert_eq!(report.violations[0].severity, Severity::Error);
    }

    #[test]
    fn validate_is_silent_when_union_branches_agree_on_null_typing() {
        let mut data = SeedData::new();
        data.push_union_group(
            "accounts",
            vec![
                vec![Some("1".to_string()), Some("'a'".to_string())],
                vec![Some("2".to_string()), Some("'b'".to_string())],
            ],
        );
        let report = validate(&data, &SchemaContext::default(), &PatternContext::default(), false);
        assert!(report.violations.is_empty());
    }
}
