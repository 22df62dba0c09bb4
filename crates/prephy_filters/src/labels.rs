//! Cluster-group labels: reading the curation table, backing it up, and
//! writing reclassified labels back.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{FilterError, Result};
use crate::table::{Delimiter, Table, CLUSTER_ID};

pub const GROUP: &str = "group";
pub const ORIGINAL_GROUP: &str = "original_group";
const BACKUP_SUFFIX: &str = "_original";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Good,
    Mua,
    Noise,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Good => "good",
            Label::Mua => "mua",
            Label::Noise => "noise",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "good" => Ok(Label::Good),
            "mua" => Ok(Label::Mua),
            "noise" => Ok(Label::Noise),
            other => Err(other.to_string()),
        }
    }
}

/// The cluster-group table as read at the start of a run.
#[derive(Debug, Clone)]
pub struct ClusterGroups {
    table: Table,
    labels: HashMap<u32, Label>,
}

impl ClusterGroups {
    pub fn read(path: &Path) -> Result<Self> {
        let table = Table::read(path, Delimiter::Tab)?;
        let ids = table.cluster_ids()?;
        let group_col = table.require_column(GROUP)?;

        let mut labels = HashMap::with_capacity(ids.len());
        for (row, id) in ids.into_iter().enumerate() {
            let label = table
                .cell(row, group_col)
                .parse::<Label>()
                .map_err(|value| FilterError::UnknownLabel {
                    cluster_id: id,
                    value,
                })?;
            labels.insert(id, label);
        }

        Ok(Self { table, labels })
    }

    pub fn path(&self) -> &Path {
        self.table.source()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label recorded for `cluster_id` before this run.
    pub fn label(&self, cluster_id: u32) -> Result<Label> {
        self.labels
            .get(&cluster_id)
            .copied()
            .ok_or_else(|| FilterError::MissingLabel {
                cluster_id,
                path: self.path().to_path_buf(),
            })
    }

    /// Write `<stem>_original.tsv` beside the table, with `group` renamed to
    /// `original_group` and every other cell left as read.
    pub fn write_backup(&self) -> Result<PathBuf> {
        let backup_path = backup_path(self.path());
        let mut snapshot = self.table.clone();
        snapshot.rename_column(GROUP, ORIGINAL_GROUP)?;
        write_staged(&snapshot, &backup_path)?;
        info!(
            "Saved original labels for {} clusters to {}",
            snapshot.len(),
            backup_path.display()
        );
        Ok(backup_path)
    }
}

/// Sibling backup path: `cluster_group.tsv` -> `cluster_group_original.tsv`.
pub fn backup_path(cluster_group_path: &Path) -> PathBuf {
    let stem = cluster_group_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match cluster_group_path.extension() {
        Some(ext) => format!("{}{}.{}", stem, BACKUP_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, BACKUP_SUFFIX),
    };
    cluster_group_path.with_file_name(file_name)
}

/// Overwrite the canonical cluster-group table with `(cluster_id, group)` rows.
pub fn write_cluster_groups(path: &Path, assignments: &[(u32, Label)]) -> Result<()> {
    let rows = assignments
        .iter()
        .map(|(id, label)| vec![id.to_string(), label.as_str().to_string()])
        .collect();
    let table = Table::new(path, vec![CLUSTER_ID.to_string(), GROUP.to_string()], rows);
    write_staged(&table, path)?;
    info!(
        "Wrote {} cluster labels to {}",
        assignments.len(),
        path.display()
    );
    Ok(())
}

/// Read a cluster-group table back as ordered `(cluster_id, label)` pairs.
pub fn read_cluster_groups(path: &Path) -> Result<Vec<(u32, Label)>> {
    let table = Table::read(path, Delimiter::Tab)?;
    let ids = table.cluster_ids()?;
    let group_col = table.require_column(GROUP)?;
    ids.into_iter()
        .enumerate()
        .map(|(row, id)| {
            table
                .cell(row, group_col)
                .parse::<Label>()
                .map(|label| (id, label))
                .map_err(|value| FilterError::UnknownLabel {
                    cluster_id: id,
                    value,
                })
        })
        .collect()
}

/// Write to a hidden temp file in the target directory, then rename over `path`.
fn write_staged(table: &Table, path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    if let Err(err) = table.write(&temp_path, Delimiter::Tab) {
        if temp_path.exists() {
            let _ = std::fs::remove_file(&temp_path);
            warn!("Removed partial temp file: {}", temp_path.display());
        }
        return Err(err);
    }

    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        FilterError::io(path, e)
    })
}
