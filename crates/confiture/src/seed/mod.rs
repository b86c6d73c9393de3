//! Seed Loading & Consistency Engine (spec §1, §4.10-§4.12): discovery,
//! validation, COPY conversion, and transactional loading of seed data.

pub mod copy;
pub mod engine;
pub mod pattern;
pub mod validator;

pub use engine::{FileResult, SeedApplyOptions, SeedApplyResult};
pub use validator::{PatternContext, SeedData, SeedRow, Severity, ValidationReport, Violation, ViolationKind};
