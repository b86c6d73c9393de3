//! Declared-schema file discovery shared by `build`, `migrate rebuild`,
//! and `migrate diff`: every `*.sql` file under the schema directory, in
//! lexical path order (spec §6 "ordering by lexical path").

use std::path::{Path, PathBuf};

use confiture::Result;
use confiture::error::{ConfigError, Error};

/// One declared-schema file, already read into memory.
pub struct SchemaFile {
    pub relative_path: String,
    pub contents: Vec<u8>,
}

/// Walk `dir` recursively collecting `*.sql` files, sorted by the path
/// relative to `dir` (byte-lexical, matching spec's ordering rule).
pub fn collect(dir: &Path) -> Result<Vec<SchemaFile>> {
    let mut paths = Vec::new();
    walk(dir, &mut paths)?;
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let relative_path = path
            .strip_prefix(dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        let contents = std::fs::read(&path).map_err(|e| {
            Error::Config(ConfigError::Io {
                path: path.clone(),
                source: e,
            })
        })?;
        files.push(SchemaFile {
            relative_path,
            contents,
        });
    }
    Ok(files)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::Config(ConfigError::Io {
            path: dir.to_path_buf(),
            source: e,
        })
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::Config(ConfigError::Io {
                path: dir.to_path_buf(),
                source: e,
            })
        })?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("sql") {
            out.push(path);
        }
    }
    Ok(())
}

/// Concatenate every file's contents, in order, as one DDL text blob
/// (used by `migrate rebuild`'s "target-state DDL", spec §4.7-R).
pub fn concatenate(files: &[SchemaFile]) -> String {
    let mut out = String::new();
    for file in files {
        out.push_str(&String::from_utf8_lossy(&file.contents));
        out.push('\n');
    }
    out
}
