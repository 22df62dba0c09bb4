//! Module input parameters, in the pipeline's JSON input convention.
//!
//! Only the sections this module reads are modelled; unknown keys in the
//! input document are ignored so the same file can drive every stage.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FilterError, Result};

pub const DEFAULT_CLUSTER_GROUP_FILE_NAME: &str = "cluster_group.tsv";
pub const DEFAULT_CLUSTER_TABLE_FILE_NAME: &str = "clus_Table.npy";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterParams {
    pub directories: Directories,
    #[serde(default)]
    pub ephys_params: EphysParams,
    pub cluster_metrics: ClusterMetricsParams,
    pub waveform_metrics: WaveformMetricsParams,
    pub prephy_filters_params: Thresholds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_json: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directories {
    pub kilosort_output_directory: PathBuf,
    #[serde(default = "default_cluster_table_file_name")]
    pub cluster_table_file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphysParams {
    #[serde(default = "default_cluster_group_file_name")]
    pub cluster_group_file_name: String,
}

impl Default for EphysParams {
    fn default() -> Self {
        Self {
            cluster_group_file_name: default_cluster_group_file_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterMetricsParams {
    /// Base of the cluster-metrics series (`metrics.csv`, `metrics_1.csv`, ...).
    pub cluster_metrics_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveformMetricsParams {
    pub waveform_metrics_file: PathBuf,
}

/// Quality thresholds for one run.
///
/// The wide-waveform check only runs when `halfwidth_max < wide_halfwidth_max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub halfwidth_max: f64,
    pub wide_halfwidth_max: f64,
    pub repo_slope: f64,
    pub snr_min: f64,
    pub mua_fr_min: f64,
    /// Deepest allowed cluster, in the same units as the derived depth.
    #[serde(rename = "depth")]
    pub depth_max: f64,
    pub isi_viol_max: f64,
    pub contam_rate_max: f64,
}

impl Thresholds {
    pub fn wide_check_active(&self) -> bool {
        self.halfwidth_max < self.wide_halfwidth_max
    }
}

impl FilterParams {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| FilterError::io(path, e))?;
        Self::from_json(&text)
    }

    pub fn cluster_group_path(&self) -> PathBuf {
        self.directories
            .kilosort_output_directory
            .join(&self.ephys_params.cluster_group_file_name)
    }

    pub fn cluster_table_path(&self) -> PathBuf {
        self.directories
            .kilosort_output_directory
            .join(&self.directories.cluster_table_file_name)
    }
}

fn default_cluster_group_file_name() -> String {
    DEFAULT_CLUSTER_GROUP_FILE_NAME.to_string()
}

fn default_cluster_table_file_name() -> String {
    DEFAULT_CLUSTER_TABLE_FILE_NAME.to_string()
}
