//! Pre-Phy filters: relabel sorted clusters as `good`, `mua` or `noise` from
//! their quality metrics before manual curation.
//!
//! A run reads the newest cluster-metrics table (merging waveform metrics when
//! needed), derives each cluster's depth from `clus_Table.npy`, backs up the
//! existing `cluster_group.tsv`, and rewrites it with the reclassified labels.

pub mod classify;
pub mod depth;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod npy;
pub mod params;
pub mod pipeline;
pub mod table;
pub mod versioning;

pub use classify::{classify, classify_cluster, Classification, Decision, Outcome, TransitionCounts};
pub use error::{FilterError, Result};
pub use labels::Label;
pub use metrics::ClusterMetrics;
pub use params::{FilterParams, Thresholds};
pub use pipeline::{filter_by_metrics, RunSummary};
pub use versioning::SeriesVersion;
