//! Depth annotation from the cluster/channel mapping table.

use std::path::Path;
use tracing::{debug, warn};

use crate::error::{FilterError, Result};
use crate::metrics::DEPTH;
use crate::npy;
use crate::table::Table;

/// Channels sharing one row of the probe's checkerboard layout.
pub const CHANNELS_PER_ROW: f64 = 2.0;
/// Vertical distance between electrode rows, in micrometres.
pub const ROW_PITCH_UM: i64 = 20;

/// Depth of a cluster whose peak channel is `channel`.
pub fn channel_depth(channel: f64) -> i64 {
    (channel / CHANNELS_PER_ROW + 1.0).floor() as i64 * ROW_PITCH_UM
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthRecord {
    /// Row in the mapping table, which is the cluster id it describes.
    pub source_row: usize,
    pub depth: i64,
}

/// Read `clus_Table.npy` (columns: spike count, peak channel) and derive depths
/// for every cluster that fired at least once, in table order.
pub fn read_depths(path: &Path) -> Result<Vec<DepthRecord>> {
    let matrix = npy::read_matrix(path)?;
    if matrix.cols() < 2 {
        return Err(FilterError::npy(
            path,
            format!("expected 2 columns, found {}", matrix.cols()),
        ));
    }

    let records: Vec<DepthRecord> = (0..matrix.rows())
        .filter_map(|row| {
            let values = matrix.row(row);
            (values[0] != 0.0).then(|| DepthRecord {
                source_row: row,
                depth: channel_depth(values[1]),
            })
        })
        .collect();

    debug!(
        "{}: {} of {} clusters have spikes",
        path.display(),
        records.len(),
        matrix.rows()
    );
    Ok(records)
}

/// Attach depths to the metrics table by row position.
///
/// The mapping table carries no cluster ids of its own, so alignment with the
/// metrics rows is positional. The row counts must match; rows whose
/// `cluster_id` differs from the mapping row are reported but not re-keyed.
pub fn annotate_depth(metrics: &mut Table, depths: &[DepthRecord]) -> Result<()> {
    if metrics.len() != depths.len() {
        return Err(FilterError::JoinMismatch {
            metrics_rows: metrics.len(),
            depth_rows: depths.len(),
        });
    }

    let ids = metrics.cluster_ids()?;
    let misaligned = ids
        .iter()
        .zip(depths)
        .filter(|(id, record)| **id as usize != record.source_row)
        .count();
    if misaligned > 0 {
        warn!(
            "{} of {} metrics rows are paired with a depth from a different cluster row",
            misaligned,
            ids.len()
        );
    }

    metrics.set_column(DEPTH, depths.iter().map(|r| r.depth.to_string()).collect());
    Ok(())
}
