//! Error taxonomy for a filter run.
//!
//! Every variant is fatal: the run aborts at the first error and nothing is
//! retried, since re-reading the same upstream artifact reproduces the failure.

use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Debug, Error)]
pub enum FilterError {
    /// A required artifact series has never been produced.
    #[error(
        "no version of {} exists; the metrics stages must run before the pre-Phy filters",
        series.display()
    )]
    PrerequisiteMissing { series: PathBuf },

    #[error("required column '{column}' missing from {}", path.display())]
    SchemaMissing { column: String, path: PathBuf },

    /// Positional depth join could not be aligned.
    #[error(
        "depth table has {depth_rows} clusters with spikes but metrics table has {metrics_rows} rows"
    )]
    JoinMismatch {
        metrics_rows: usize,
        depth_rows: usize,
    },

    #[error("cluster {cluster_id} appears more than once in {}", path.display())]
    DuplicateCluster { cluster_id: u32, path: PathBuf },

    #[error("cluster {cluster_id} has no entry in cluster-group table {}", path.display())]
    MissingLabel { cluster_id: u32, path: PathBuf },

    #[error("cluster {cluster_id} has unrecognised label '{value}'")]
    UnknownLabel { cluster_id: u32, value: String },

    /// A metric cell the rule chain depends on is empty or non-numeric.
    #[error("cluster {cluster_id} has no usable value for '{field}' ({value:?})")]
    IncompleteMetrics {
        cluster_id: String,
        field: &'static str,
        value: String,
    },

    #[error("cannot decode {}: {message}", path.display())]
    Npy { path: PathBuf, message: String },

    #[error("invalid parameter set: {0}")]
    Params(#[from] serde_json::Error),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed table {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl FilterError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        FilterError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn csv(path: &Path, source: csv::Error) -> Self {
        FilterError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn npy(path: &Path, message: impl Into<String>) -> Self {
        FilterError::Npy {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn schema(column: impl Into<String>, path: &Path) -> Self {
        FilterError::SchemaMissing {
            column: column.into(),
            path: path.to_path_buf(),
        }
    }
}
