//! Numbered artifact series: `name.ext`, `name_1.ext`, `name_2.ext`, ...
//!
//! Re-running a pipeline stage writes the next member of the series instead
//! of overwriting, so the most recent member is the authoritative one.
//!
//! Ordinal convention:
//! - `0`: the base file does not exist
//! - `1`: only the base file exists
//! - `k > 1`: the newest member carries the stem suffix `_{k-1}`
//!
//! The series is contiguous; probing stops at the first missing suffix.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{FilterError, Result};

/// Result of resolving one artifact series on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesVersion {
    base: PathBuf,
    ordinal: u32,
}

impl SeriesVersion {
    /// Probe the filesystem for the newest member of the series rooted at `base`.
    pub fn resolve(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let mut ordinal = 0;
        while version_path(&base, ordinal).exists() {
            ordinal += 1;
        }
        debug!(series = %base.display(), ordinal, "resolved artifact series");
        Self { base, ordinal }
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// Ordinal the next write would carry.
    pub fn next_ordinal(&self) -> u32 {
        self.ordinal + 1
    }

    /// Path of the newest existing member, if any.
    pub fn current(&self) -> Option<PathBuf> {
        match self.ordinal {
            0 => None,
            ordinal => Some(version_path(&self.base, ordinal - 1)),
        }
    }

    /// Path the next write should use.
    pub fn next(&self) -> PathBuf {
        version_path(&self.base, self.ordinal)
    }

    /// Like [`current`](Self::current), but a never-produced series is an error.
    pub fn require_current(&self) -> Result<PathBuf> {
        self.current().ok_or_else(|| FilterError::PrerequisiteMissing {
            series: self.base.clone(),
        })
    }
}

/// Path of the series member with the given zero-based suffix index.
///
/// Index 0 is the unsuffixed base; index `n` appends `_n` to the file stem.
pub fn version_path(base: &Path, index: u32) -> PathBuf {
    if index == 0 {
        return base.to_path_buf();
    }

    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match base.extension() {
        Some(ext) => format!("{}_{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}_{}", stem, index),
    };
    base.with_file_name(file_name)
}
