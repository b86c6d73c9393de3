//! Project directory layout (spec §6): `confiture.toml`'s directory is the
//! project root, and the four well-known subdirectories hang off it.

use std::path::{Path, PathBuf};

/// The four directories the core reads from, resolved relative to the
/// directory containing `confiture.toml`.
#[derive(Debug, Clone)]
pub struct ProjectDirs {
    pub schema_dir: PathBuf,
    pub migrations_dir: PathBuf,
    pub schema_history_dir: PathBuf,
    pub seeds_dir: PathBuf,
}

impl ProjectDirs {
    pub fn from_config_path(config_path: &Path) -> Self {
        let root = config_path.parent().unwrap_or_else(|| Path::new("."));
        ProjectDirs {
            schema_dir: root.join("db/schema"),
            migrations_dir: root.join("db/migrations"),
            schema_history_dir: root.join("db/schema_history"),
            seeds_dir: root.join("db/seeds"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_subdirectories_relative_to_config_parent() {
        let dirs = ProjectDirs::from_config_path(Path::new("/project/confiture.toml"));
        assert_eq!(dirs.schema_dir, PathBuf::from("/project/db/schema"));
        assert_eq!(dirs.migrations_dir, PathBuf::from("/project/db/migrations"));
        assert_eq!(dirs.seeds_dir, PathBuf::from("/project/db/seeds"));
    }
}
