//! One filter run: resolve, assemble, annotate, back up, classify, write.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

use crate::classify::{classify, TransitionCounts};
use crate::depth::{annotate_depth, read_depths};
use crate::error::Result;
use crate::labels::{write_cluster_groups, ClusterGroups};
use crate::metrics::{assemble_metrics, cluster_metrics};
use crate::params::FilterParams;

/// Outcome of a completed run, serialised into the module's output manifest.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    /// Wall-clock seconds.
    pub execution_time: f64,
    pub quality_metrics_output_file: PathBuf,
    pub cluster_group_file: PathBuf,
    pub original_cluster_group_file: PathBuf,
    pub cluster_count: usize,
    #[serde(flatten)]
    pub transitions: TransitionCounts,
}

/// Reclassify every cluster of one sorting output according to its metrics.
///
/// The original labels are backed up before classification starts, so the
/// backup exists even if classification fails; the canonical cluster-group
/// table is only overwritten after every cluster has been classified.
pub fn filter_by_metrics(params: &FilterParams) -> Result<RunSummary> {
    let started_at = Utc::now();
    let start = Instant::now();
    info!("pre-Phy filters: {}", params.directories.kilosort_output_directory.display());

    let mut metrics = assemble_metrics(
        &params.cluster_metrics.cluster_metrics_file,
        &params.waveform_metrics.waveform_metrics_file,
    )?;

    let cluster_group_path = params.cluster_group_path();
    let groups = ClusterGroups::read(&cluster_group_path)?;

    let depths = read_depths(&params.cluster_table_path())?;
    annotate_depth(&mut metrics, &depths)?;

    let backup_path = groups.write_backup()?;
    let clusters = cluster_metrics(&metrics)?;

    let classification = classify(&clusters, &params.prephy_filters_params, |id| {
        groups.label(id)
    })?;
    for decision in classification.decisions.iter().filter(|d| d.label != d.original) {
        debug!(
            cluster_id = decision.cluster_id,
            outcome = ?decision.outcome,
            "{} -> {}",
            decision.original,
            decision.label
        );
    }

    write_cluster_groups(&cluster_group_path, &classification.assignments())?;

    let counts = classification.counts;
    info!(
        "Reclassified {} good clusters as MUA, {} MUA clusters as good, and {} clusters as noise from {} clusters",
        counts.good_to_mua,
        counts.mua_to_good,
        counts.to_noise,
        clusters.len()
    );

    let execution_time = start.elapsed().as_secs_f64();
    info!("total time: {:.2} seconds", execution_time);

    Ok(RunSummary {
        started_at,
        execution_time,
        quality_metrics_output_file: params.cluster_metrics.cluster_metrics_file.clone(),
        cluster_group_file: cluster_group_path,
        original_cluster_group_file: backup_path,
        cluster_count: clusters.len(),
        transitions: counts,
    })
}
