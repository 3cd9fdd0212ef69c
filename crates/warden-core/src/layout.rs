//! Lifecycle directory layout.
//!
//! A file governed in live mode lives in exactly one place at a time:
//!
//!   source ──► staging/<id>.tmp ──► working/<id>-<name> ──► final/<id>-<name>
//!                                                        └──► error/<id>-<name>
//!
//! Names past staging carry the execution id, so two sources holding the
//! same file name never meet in one lifecycle directory.
//!
//! The two renames into working are not atomic as a pair.  A crash between
//! them leaves a `.tmp` file in staging, which startup recovery quarantines.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Suffix of in-transit files in the staging directory.
pub const STAGING_SUFFIX: &str = ".tmp";

/// Paths of the lifecycle directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    pub staging: PathBuf,
    pub working: PathBuf,
    pub final_dir: PathBuf,
    pub error: PathBuf,
}

impl DirectoryLayout {
    /// Standard layout: `staging/`, `working/` and `error/` under a single
    /// processing directory, with a separate success archive.
    pub fn under(processing: &Path, final_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging: processing.join("staging"),
            working: processing.join("working"),
            final_dir: final_dir.into(),
            error: processing.join("error"),
        }
    }

    /// Create every lifecycle directory that does not exist yet.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [&self.staging, &self.working, &self.final_dir, &self.error] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn staging_path(&self, execution_id: &str) -> PathBuf {
        self.staging.join(format!("{execution_id}{STAGING_SUFFIX}"))
    }

    pub fn working_path(&self, execution_id: &str, filename: &str) -> PathBuf {
        self.working.join(lifecycle_name(execution_id, filename))
    }

    pub fn final_path(&self, execution_id: &str, filename: &str) -> PathBuf {
        self.final_dir.join(lifecycle_name(execution_id, filename))
    }

    pub fn error_path(&self, execution_id: &str, filename: &str) -> PathBuf {
        self.error.join(lifecycle_name(execution_id, filename))
    }

    /// Files left behind in staging, sorted by name.
    ///
    /// A missing staging directory has no orphans.
    pub fn staged_orphans(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.staging) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut orphans = Vec::new();
        for entry in entries {
            let entry = entry?;
            let is_tmp = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(STAGING_SUFFIX));
            if is_tmp && entry.file_type()?.is_file() {
                orphans.push(entry.path());
            }
        }
        orphans.sort();
        Ok(orphans)
    }
}

/// Name of a governed file once it has left its source directory.
pub fn lifecycle_name(execution_id: &str, filename: &str) -> String {
    format!("{execution_id}-{filename}")
}

/// Execution id encoded in a staging file name (`<id>.tmp` → `<id>`).
pub fn execution_id_from_staging(path: &Path) -> Option<String> {
    path.file_name()?
        .to_str()?
        .strip_suffix(STAGING_SUFFIX)
        .map(str::to_string)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
