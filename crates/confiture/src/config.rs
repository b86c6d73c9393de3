//! Configuration (spec §6/§10): a `serde`-deserializable settings record
//! loaded from `confiture.toml`, found by walking up the directory tree,
//! with `dotenvy`-loaded environment variables overriding file values.
//!
//! The directory walk mirrors the teacher's `dibs-cli::config::load_from`
//! / `find_config_file` (loop + `pop()`); `serde` + `toml` + `dotenvy`
//! replace the teacher's `facet_styx` parsing of `.config/dibs.styx`,
//! adopted from `kclaka-seedkit`, the pack's other Postgres-seeding tool,
//! which loads its own settings with exactly this combination.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigError, Error, Result};

pub const CONFIG_FILE_NAME: &str = "confiture.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub exclude_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub build: BuildConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub tracking_table: String,
    pub rebuild_threshold: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        MigrationConfig {
            tracking_table: "confiture_migrations".to_string(),
            rebuild_threshold: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub lint: LintConfig,
    pub validate_comments: ValidateCommentsConfig,
    pub separators: SeparatorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LintConfig {
    pub fail_on_warning: bool,
}

impl Default for LintConfig {
    fn default() -> Self {
        LintConfig { fail_on_warning: false }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidateCommentsConfig {
    pub enabled: bool,
}

impl Default for ValidateCommentsConfig {
    fn default() -> Self {
        ValidateCommentsConfig { enabled: true }
    }
}

/// The comment style used as a separator between concatenated schema
/// files during `build` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparatorStyle {
    BlockComment,
    LineComment,
    Mysql,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeparatorsConfig {
    pub style: SeparatorStyle,
}

impl Default for SeparatorsConfig {
    fn default() -> Self {
        SeparatorsConfig {
            style: SeparatorStyle::BlockComment,
        }
    }
}

/// Load configuration, searching up from the current directory.
pub fn load() -> Result<(Config, PathBuf)> {
    let cwd = std::env::current_dir().map_err(|e| {
        Error::Config(ConfigError::Io {
            path: PathBuf::from("."),
            source: e,
        })
    })?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory, applying
/// `dotenvy`-sourced environment overrides for `DATABASE_URL` last.
pub fn load_from(start: &Path) -> Result<(Config, PathBuf)> {
    dotenvy::dotenv().ok();

    let config_path = find_config_file(start)?;
    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        Error::Config(ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })
    })?;

    let mut config: Config = toml::from_str(&content).map_err(|e| {
        Error::Config(ConfigError::Parse {
            path: config_path.clone(),
            message: e.to_string(),
        })
    })?;

    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database_url = url;
    }

    crate::identifier::validate(&config.migration.tracking_table)?;

    Ok((config, config_path))
}

fn find_config_file(start: &Path) -> Result<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !current.pop() {
            return Err(Error::Config(ConfigError::NotFound {
                start: start.to_path_buf(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, contents: &str) {
        let mut f = std::fs::File::create(dir.join(CONFIG_FILE_NAME)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "database_url = \"postgres://localhost/test\"\n");
        let (config, path) = load_from(dir.path()).unwrap();
        assert_eq!(config.database_url, "postgres://localhost/test");
        assert_eq!(config.migration.tracking_table, "confiture_migrations");
        assert_eq!(path, dir.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn searches_up_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "database_url = \"postgres://localhost/test\"\n");
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        let (config, path) = load_from(&nested).unwrap();
        assert_eq!(config.database_url, "postgres://localhost/test");
        assert_eq!(path, dir.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn rejects_unsafe_tracking_table_name() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "database_url = \"postgres://localhost/test\"\n[migration]\ntracking_table = \"bad; drop table x\"\n",
        );
        assert!(load_from(dir.path()).is_err());
    }

    #[test]
    fn missing_config_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from(dir.path()).is_err());
    }
}
