#![allow(clippy::result_large_err)]
#![allow(clippy::type_complexity)]

//! confiture: a PostgreSQL schema and data lifecycle toolkit.
//!
//! This crate provides:
//! - A tokenizing SQL scanner for splitting `.sql` files into statements
//! - A DDL parser that extracts structural facts (tables, columns, keys) from schema text
//! - Live catalog introspection via `pg_catalog`
//! - Schema normalization, fingerprinting, and fuzzy baseline detection
//! - A migration engine with transactional, savepoint-scoped apply/rollback and a
//!   rebuild protocol for throwaway environments
//! - Seed data validation and bulk loading, with an INSERT-to-COPY fast path
//! - A hook phase model for injecting custom logic around migration lifecycle events
//!
//! Everything here operates on a single connection per invocation; there is no
//! long-running service, daemon, or background worker anywhere in this crate.

pub mod baseline;
pub mod config;
pub mod ddl;
mod ddl_tokenize;
pub mod diff;
pub mod dry_run;
pub mod error;
pub mod hooks;
pub mod identifier;
pub mod introspect;
pub mod lock;
pub mod migrate;
pub mod model;
pub mod normalize;
pub mod scanner;
pub mod seed;
pub mod similarity;
pub mod snapshot;
pub mod tracking;

pub use diff::{SchemaChange, SchemaDiff};
pub use error::{Error, Result};
pub use identifier::quote_ident;
pub use migrate::{
    MigrateRebuildResult, MigrationEngine, MigrationStatus, MigrationUnit, Strategy,
};
pub use model::{SchemaContext, StructuralFacts};
