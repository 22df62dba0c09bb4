//! Assembly of the per-cluster metrics table the classifier reads.

use std::path::Path;
use tracing::{debug, info};

use crate::error::{FilterError, Result};
use crate::table::{parse_metric, Delimiter, Table, CLUSTER_ID};
use crate::versioning::SeriesVersion;

pub const SNR: &str = "snr";
pub const HALFWIDTH: &str = "halfwidth";
pub const REPOLARIZATION_SLOPE: &str = "repolarization_slope";
pub const FIRING_RATE: &str = "firing_rate";
pub const ISI_VIOL: &str = "isi_viol";
pub const NUM_VIOL: &str = "num_viol";
pub const CONTAM_RATE: &str = "contam_rate";
pub const DEPTH: &str = "depth";

/// Load the newest cluster-metrics table, merging in the newest
/// waveform-metrics table when `snr` was not carried over upstream.
pub fn assemble_metrics(cluster_metrics_base: &Path, waveform_metrics_base: &Path) -> Result<Table> {
    let metrics_path = SeriesVersion::resolve(cluster_metrics_base).require_current()?;
    let metrics = Table::read(&metrics_path, Delimiter::Comma)?;
    metrics.require_column(CLUSTER_ID)?;
    info!(
        "Loaded {} clusters from {}",
        metrics.len(),
        metrics_path.display()
    );

    if metrics.has_column(SNR) {
        return Ok(metrics);
    }

    let waveform_path = SeriesVersion::resolve(waveform_metrics_base).require_current()?;
    debug!(
        "{} has no '{}' column; merging {}",
        metrics_path.display(),
        SNR,
        waveform_path.display()
    );
    let waveform = Table::read(&waveform_path, Delimiter::Comma)?;
    waveform.require_column(CLUSTER_ID)?;

    let merged = metrics.inner_join(&waveform)?;
    if !merged.has_column(SNR) {
        return Err(FilterError::schema(SNR, &waveform_path));
    }
    info!(
        "Merged waveform metrics: {} of {} clusters present in both tables",
        merged.len(),
        metrics.len()
    );
    Ok(merged)
}

/// One row of the assembled table, typed for rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterMetrics {
    pub cluster_id: u32,
    pub snr: f64,
    pub halfwidth: f64,
    pub repolarization_slope: f64,
    pub firing_rate: f64,
    pub isi_viol: f64,
    pub num_viol: f64,
    pub contam_rate: f64,
    pub depth: f64,
}

/// Column positions of every field the rule chain reads.
struct Columns {
    snr: usize,
    halfwidth: usize,
    repolarization_slope: usize,
    firing_rate: usize,
    isi_viol: usize,
    num_viol: usize,
    contam_rate: usize,
    depth: usize,
}

impl Columns {
    fn locate(table: &Table) -> Result<Self> {
        Ok(Self {
            snr: table.require_column(SNR)?,
            halfwidth: table.require_column(HALFWIDTH)?,
            repolarization_slope: table.require_column(REPOLARIZATION_SLOPE)?,
            firing_rate: table.require_column(FIRING_RATE)?,
            isi_viol: table.require_column(ISI_VIOL)?,
            num_viol: table.require_column(NUM_VIOL)?,
            contam_rate: table.require_column(CONTAM_RATE)?,
            depth: table.require_column(DEPTH)?,
        })
    }
}

/// Type every row of an assembled, depth-annotated table.
///
/// A missing or non-numeric cell in any rule field fails the whole run:
/// partial metrics mean an upstream stage produced a corrupt table.
pub fn cluster_metrics(table: &Table) -> Result<Vec<ClusterMetrics>> {
    let ids = table.cluster_ids()?;
    let cols = Columns::locate(table)?;

    ids.into_iter()
        .enumerate()
        .map(|(row, cluster_id)| {
            let field = |name: &'static str, col: usize| -> Result<f64> {
                let raw = table.cell(row, col);
                parse_metric(raw).ok_or_else(|| FilterError::IncompleteMetrics {
                    cluster_id: cluster_id.to_string(),
                    field: name,
                    value: raw.to_string(),
                })
            };
            Ok(ClusterMetrics {
                cluster_id,
                snr: field(SNR, cols.snr)?,
                halfwidth: field(HALFWIDTH, cols.halfwidth)?,
                repolarization_slope: field(REPOLARIZATION_SLOPE, cols.repolarization_slope)?,
                firing_rate: field(FIRING_RATE, cols.firing_rate)?,
                isi_viol: field(ISI_VIOL, cols.isi_viol)?,
                num_viol: field(NUM_VIOL, cols.num_viol)?,
                contam_rate: field(CONTAM_RATE, cols.contam_rate)?,
                depth: field(DEPTH, cols.depth)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const QUALITY: &str = ",cluster_id,firing_rate,isi_viol,num_viol,contam_rate\n\
                           0,1,2.0,0.1,0,0.05\n\
                           1,4,0.5,0.9,7,0.4\n\
                           2,6,3.0,0.0,0,0.0\n";
    const WAVEFORM: &str = ",cluster_id,snr,halfwidth,repolarization_slope\n\
                            0,6,5.0,0.2,0.4\n\
                            1,1,2.5,0.3,0.1\n";

    #[test]
    fn table_with_snr_is_used_as_is() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("metrics.csv"), "cluster_id,snr\n1,3.0\n").unwrap();

        let t = assemble_metrics(
            &dir.path().join("metrics.csv"),
            &dir.path().join("waveform_metrics.csv"),
        )
        .unwrap();
        assert_eq!(t.columns(), &["cluster_id", "snr"]);
    }

    #[test]
    fn newest_version_is_read() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("metrics.csv"), "cluster_id,snr\n1,3.0\n").unwrap();
        fs::write(dir.path().join("metrics_1.csv"), "cluster_id,snr\n1,9.0\n2,8.0\n").unwrap();

        let t = assemble_metrics(
            &dir.path().join("metrics.csv"),
            &dir.path().join("waveform_metrics.csv"),
        )
        .unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.source(), dir.path().join("metrics_1.csv"));
    }

    #[test]
    fn missing_snr_merges_waveform_metrics() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("metrics.csv"), QUALITY).unwrap();
        fs::write(dir.path().join("waveform_metrics.csv"), WAVEFORM).unwrap();

        let t = assemble_metrics(
            &dir.path().join("metrics.csv"),
            &dir.path().join("waveform_metrics.csv"),
        )
        .unwrap();
        // cluster 4 has no waveform row and is dropped; metrics order is kept
        assert_eq!(t.cluster_ids().unwrap(), vec![1, 6]);
        let snr = t.column_index(SNR).unwrap();
        assert_eq!(t.cell(0, snr), "2.5");
        assert_eq!(t.cell(1, snr), "5.0");
    }

    #[test]
    fn missing_metrics_series_is_prerequisite_error() {
        let dir = tempdir().unwrap();
        let err = assemble_metrics(
            &dir.path().join("metrics.csv"),
            &dir.path().join("waveform_metrics.csv"),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::PrerequisiteMissing { .. }));
    }

    #[test]
    fn missing_waveform_series_when_needed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("metrics.csv"), QUALITY).unwrap();

        let err = assemble_metrics(
            &dir.path().join("metrics.csv"),
            &dir.path().join("waveform_metrics.csv"),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::PrerequisiteMissing { .. }));
    }

    #[test]
    fn waveform_table_without_snr_is_schema_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("metrics.csv"), QUALITY).unwrap();
        fs::write(dir.path().join("waveform_metrics.csv"), "cluster_id,halfwidth\n1,0.2\n").unwrap();

        let err = assemble_metrics(
            &dir.path().join("metrics.csv"),
            &dir.path().join("waveform_metrics.csv"),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::SchemaMissing { ref column, .. } if column == "snr"));
    }

    #[test]
    fn metrics_without_cluster_id_is_schema_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("metrics.csv"), "id,snr\n1,3.0\n").unwrap();

        let err = assemble_metrics(
            &dir.path().join("metrics.csv"),
            &dir.path().join("waveform_metrics.csv"),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::SchemaMissing { ref column, .. } if column == "cluster_id"));
    }

    fn typed_table(depth: &str) -> Table {
        Table::new(
            "m.csv",
            [
                "cluster_id", "snr", "halfwidth", "repolarization_slope", "firing_rate",
                "isi_viol", "num_viol", "contam_rate", "depth",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            vec![["3", "4.5", "0.25", "0.6", "1.2", "0.0", "0", "0.01", depth]
                .iter()
                .map(|s| s.to_string())
                .collect()],
        )
    }

    #[test]
    fn typed_rows_parse_every_field() {
        let rows = cluster_metrics(&typed_table("120")).unwrap();
        assert_eq!(
            rows,
            vec![ClusterMetrics {
                cluster_id: 3,
                snr: 4.5,
                halfwidth: 0.25,
                repolarization_slope: 0.6,
                firing_rate: 1.2,
                isi_viol: 0.0,
                num_viol: 0.0,
                contam_rate: 0.01,
                depth: 120.0,
            }]
        );
    }

    #[test]
    fn empty_metric_cell_fails() {
        let err = cluster_metrics(&typed_table("")).unwrap_err();
        assert!(matches!(
            err,
            FilterError::IncompleteMetrics { field: "depth", .. }
        ));
    }
}
