//! `confiture` — command-line interface for the schema and data lifecycle
//! engine (spec §6).

mod commands;
mod config;
mod connect;
mod schema_files;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use confiture::config::Config as CoreConfig;

use crate::config::ProjectDirs;

#[derive(Parser)]
#[command(name = "confiture", version, about = "PostgreSQL schema and data lifecycle tool")]
struct Cli {
    /// Path to `confiture.toml`. Defaults to searching upward from the
    /// current directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build declared schema text, compute content hash, write snapshot.
    Build,

    /// Emit live StructuralFacts.
    Introspect {
        #[arg(long, default_value = "public")]
        schema: String,
        /// Print as reconstructed `CREATE TABLE` SQL instead of JSON.
        #[arg(long)]
        sql: bool,
    },

    /// Schema migration lifecycle.
    Migrate {
        #[command(subcommand)]
        command: MigrateCommands,
    },

    /// Seed data lifecycle.
    Seed {
        #[command(subcommand)]
        command: SeedCommands,
    },

    /// Run comment-balance lint over the declared schema.
    Lint {
        #[arg(long)]
        fail_on_warning: bool,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Applied/pending/orphaned table.
    Status,
    /// Apply pending units in order.
    Up {
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Reverse the last N applied units.
    Down {
        #[arg(long, default_value_t = 1)]
        steps: usize,
        #[arg(long)]
        dry_run: bool,
    },
    /// Drop and recreate schema(s) from declared DDL.
    Rebuild {
        #[arg(long = "drop-schemas", value_delimiter = ',')]
        drop_schemas: Vec<String>,
        #[arg(long)]
        seed: bool,
        #[arg(long)]
        backup_tracking: bool,
        #[arg(long)]
        verify: bool,
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Resync tracking without executing SQL.
    Reinit {
        #[arg(long)]
        through: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Schema change list between two sides (`live` or a snapshot/path).
    Diff { a: String, b: String },
    /// Orphaned/duplicate version report.
    Validate,
}

#[derive(Subcommand)]
enum SeedCommands {
    /// Load seed data.
    Apply {
        #[arg(long)]
        copy_format: bool,
        #[arg(long, default_value_t = 100)]
        copy_threshold: usize,
        #[arg(long)]
        continue_on_error: bool,
    },
    /// Print seed files rewritten to COPY form where eligible.
    Convert {
        #[arg(long, default_value_t = 100)]
        copy_threshold: usize,
    },
    /// Time VALUES-based vs COPY-based loading for each seed file.
    Benchmark,
    /// Validate seed data against the declared schema.
    Validate {
        #[arg(long)]
        uuid_validation: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let (core_config, config_path) = match &cli.config {
        Some(path) => match confiture::config::load_from(path.parent().unwrap_or(path)) {
            Ok(loaded) => loaded,
            Err(e) => return report_error(&e),
        },
        None => match confiture::config::load() {
            Ok(loaded) => loaded,
            Err(e) => return report_error(&e),
        },
    };
    let dirs = ProjectDirs::from_config_path(&config_path);

    let result = dispatch(&cli.command, &core_config, &dirs).await;
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => report_error(&e),
    }
}

/// Dispatches to the command implementations, returning `Ok(false)` for
/// commands whose own semantics decide "unresolved pending state" (spec
/// §6 exit codes), `Ok(true)` otherwise.
async fn dispatch(command: &Commands, config: &CoreConfig, dirs: &ProjectDirs) -> confiture::Result<bool> {
    match command {
        Commands::Build => {
            commands::schema::build(dirs)?;
            Ok(true)
        }
        Commands::Introspect { schema, sql } => {
            commands::schema::introspect(config, schema, *sql).await?;
            Ok(true)
        }
        Commands::Lint { fail_on_warning } => {
            commands::schema::lint(dirs, *fail_on_warning)?;
            Ok(true)
        }
        Commands::Migrate { command } => dispatch_migrate(command, config, dirs).await,
        Commands::Seed { command } => dispatch_seed(command, config, dirs).await,
    }
}

async fn dispatch_migrate(
    command: &MigrateCommands,
    config: &CoreConfig,
    dirs: &ProjectDirs,
) -> confiture::Result<bool> {
    match command {
        MigrateCommands::Status => commands::migrate::status(config, dirs).await,
        MigrateCommands::Up { target, dry_run } => {
            commands::migrate::up(config, dirs, target.as_deref(), *dry_run).await?;
            Ok(true)
        }
        MigrateCommands::Down { steps, dry_run } => {
            commands::migrate::down(config, dirs, *steps, *dry_run).await?;
            Ok(true)
        }
        MigrateCommands::Rebuild {
            drop_schemas,
            seed,
            backup_tracking,
            verify,
            yes,
            dry_run,
        } => {
            commands::migrate::rebuild(
                config,
                dirs,
                drop_schemas,
                *seed,
                *backup_tracking,
                *verify,
                *yes,
                *dry_run,
            )
            .await?;
            Ok(true)
        }
        MigrateCommands::Reinit { through, dry_run } => {
            commands::migrate::reinit(config, dirs, through.as_deref(), *dry_run).await?;
            Ok(true)
        }
        MigrateCommands::Diff { a, b } => {
            commands::migrate::diff(config, dirs, a, b).await?;
            Ok(true)
        }
        MigrateCommands::Validate => commands::migrate::validate(config, dirs).await,
    }
}

async fn dispatch_seed(
    command: &SeedCommands,
    config: &CoreConfig,
    dirs: &ProjectDirs,
) -> confiture::Result<bool> {
    match command {
        SeedCommands::Apply {
            copy_format,
            copy_threshold,
            continue_on_error,
        } => {
            commands::seed::apply(config, dirs, *copy_format, *copy_threshold, *continue_on_error).await
        }
        SeedCommands::Convert { copy_threshold } => {
            commands::seed::convert(dirs, *copy_threshold)?;
            Ok(true)
        }
        SeedCommands::Benchmark => {
            commands::seed::benchmark(config, dirs).await?;
            Ok(true)
        }
        SeedCommands::Validate { uuid_validation } => {
            let files = schema_files::collect(&dirs.schema_dir)?;
            let declared_ddl = schema_files::concatenate(&files);
            let declared_facts = confiture::ddl::parse(&declared_ddl).facts;
            commands::seed::validate(config, dirs, &declared_facts, *uuid_validation).await
        }
    }
}

/// Maps a closed-taxonomy error to the process exit code (spec §6:
/// `0` success, `1` generic failure, `2` misconfiguration, `3` fatal).
fn report_error(err: &confiture::Error) -> i32 {
    eprintln!("error [{}]: {err}", err.code());
    match err {
        confiture::Error::Config(_) => 2,
        confiture::Error::Sql(_) => 3,
        confiture::Error::Migration(confiture::error::MigrationError::LockTimeout { .. }) => 3,
        confiture::Error::Migration(confiture::error::MigrationError::StoreUnavailable { .. }) => 3,
        _ => 1,
    }
}
