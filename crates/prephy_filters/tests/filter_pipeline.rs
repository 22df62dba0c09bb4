//! End-to-end runs over a synthetic Kilosort output directory.

use prephy_filters::labels::read_cluster_groups;
use prephy_filters::{filter_by_metrics, FilterError, FilterParams, Label};
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const CLUSTER_GROUP: &str = "cluster_id\tgroup\n0\tgood\n1\tmua\n2\tgood\n3\tmua\n4\tgood\n5\tnoise\n";

/// Quality metrics without `snr`, so waveform metrics must be merged in.
/// Cluster 6 has no spikes and no metrics row.
const METRICS: &str = "\
,cluster_id,firing_rate,isi_viol,num_viol,contam_rate,epoch_name
0,0,5.0,0.1,0,0.02,complete_session
1,1,3.0,0.2,1,0.10,complete_session
2,2,2.0,0.9,8,0.10,complete_session
3,3,0.05,0.0,0,0.00,complete_session
4,4,4.0,0.0,0,0.05,complete_session
5,5,6.0,0.0,0,0.01,complete_session
";

const WAVEFORM_METRICS: &str = "\
,cluster_id,snr,halfwidth,repolarization_slope,epoch_name
0,0,6.0,0.20,0.50,complete_session
1,1,5.0,0.25,0.40,complete_session
2,2,4.0,0.22,0.45,complete_session
3,3,7.0,0.21,0.50,complete_session
4,4,5.5,0.40,0.05,complete_session
5,5,8.0,0.20,0.60,complete_session
";

fn write_npy_i64(path: &Path, rows: &[[i64; 2]]) {
    let mut header = format!(
        "{{'descr': '<i8', 'fortran_order': False, 'shape': ({}, 2), }}",
        rows.len()
    );
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');

    let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for row in rows {
        for value in row {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    fs::write(path, bytes).unwrap();
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cluster_group.tsv"), CLUSTER_GROUP).unwrap();
        fs::write(dir.path().join("metrics.csv"), METRICS).unwrap();
        fs::write(dir.path().join("waveform_metrics.csv"), WAVEFORM_METRICS).unwrap();
        write_npy_i64(
            &dir.path().join("clus_Table.npy"),
            &[[100, 10], [80, 20], [60, 30], [10, 40], [90, 50], [70, 380], [0, 60]],
        );
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn params(&self) -> FilterParams {
        let json = serde_json::json!({
            "directories": { "kilosort_output_directory": self.path() },
            "ephys_params": { "cluster_group_file_name": "cluster_group.tsv" },
            "cluster_metrics": { "cluster_metrics_file": self.path().join("metrics.csv") },
            "waveform_metrics": { "waveform_metrics_file": self.path().join("waveform_metrics.csv") },
            "prephy_filters_params": {
                "halfwidth_max": 0.35,
                "wide_halfwidth_max": 0.5,
                "repo_slope": 0.1,
                "snr_min": 3.0,
                "mua_fr_min": 0.1,
                "depth": 3000,
                "isi_viol_max": 0.5,
                "contam_rate_max": 0.3
            }
        });
        FilterParams::from_json(&json.to_string()).unwrap()
    }
}

#[test]
fn full_run_reclassifies_and_backs_up() {
    let fx = Fixture::new();
    let summary = filter_by_metrics(&fx.params()).unwrap();

    // 0 good, clean                        -> good
    // 1 mua, clean                         -> good (rescued)
    // 2 good, isi 0.9 with 8 violations    -> mua
    // 3 mua, firing rate below minimum     -> noise
    // 4 good, wide and flat waveform       -> noise
    // 5 noise, channel 380 -> depth 3820   -> noise
    let labels = read_cluster_groups(&fx.path().join("cluster_group.tsv")).unwrap();
    assert_eq!(
        labels,
        vec![
            (0, Label::Good),
            (1, Label::Good),
            (2, Label::Mua),
            (3, Label::Noise),
            (4, Label::Noise),
            (5, Label::Noise),
        ]
    );

    assert_eq!(summary.cluster_count, 6);
    assert_eq!(summary.transitions.good_to_mua, 1);
    assert_eq!(summary.transitions.mua_to_good, 1);
    assert_eq!(summary.transitions.to_noise, 3);
    assert_eq!(
        summary.original_cluster_group_file,
        fx.path().join("cluster_group_original.tsv")
    );

    let backup = fs::read_to_string(fx.path().join("cluster_group_original.tsv")).unwrap();
    assert_eq!(backup, CLUSTER_GROUP.replacen("group", "original_group", 1));
}

#[test]
fn newest_metrics_version_drives_the_run() {
    let fx = Fixture::new();
    // a re-run of the metrics stage wrote metrics_1.csv, with snr included
    let rerun = "\
cluster_id,firing_rate,isi_viol,num_viol,contam_rate,snr,halfwidth,repolarization_slope
0,5.0,0.1,0,0.90,6.0,0.2,0.5
1,3.0,0.2,1,0.10,6.0,0.2,0.5
2,2.0,0.1,0,0.10,6.0,0.2,0.5
3,3.0,0.1,0,0.10,6.0,0.2,0.5
4,4.0,0.1,0,0.10,6.0,0.2,0.5
5,6.0,0.1,0,0.10,6.0,0.2,0.5
";
    fs::write(fx.path().join("metrics_1.csv"), rerun).unwrap();
    // depth for cluster 5 must be in range for this scenario
    write_npy_i64(
        &fx.path().join("clus_Table.npy"),
        &[[1, 0], [1, 1], [1, 2], [1, 3], [1, 4], [1, 5]],
    );

    let summary = filter_by_metrics(&fx.params()).unwrap();
    let labels = read_cluster_groups(&fx.path().join("cluster_group.tsv")).unwrap();
    assert_eq!(
        labels,
        vec![
            (0, Label::Mua),
            (1, Label::Good),
            (2, Label::Good),
            (3, Label::Good),
            (4, Label::Good),
            (5, Label::Noise),
        ]
    );
    assert_eq!(summary.transitions.good_to_mua, 1);
    assert_eq!(summary.transitions.mua_to_good, 2);
    assert_eq!(summary.transitions.to_noise, 0);
}

#[test]
fn missing_metrics_aborts_before_any_write() {
    let fx = Fixture::new();
    fs::remove_file(fx.path().join("metrics.csv")).unwrap();

    let err = filter_by_metrics(&fx.params()).unwrap_err();
    assert!(matches!(err, FilterError::PrerequisiteMissing { .. }));
    assert!(!fx.path().join("cluster_group_original.tsv").exists());
    assert_eq!(
        fs::read_to_string(fx.path().join("cluster_group.tsv")).unwrap(),
        CLUSTER_GROUP
    );
}

#[test]
fn depth_row_mismatch_is_fatal() {
    let fx = Fixture::new();
    write_npy_i64(&fx.path().join("clus_Table.npy"), &[[5, 1], [5, 2]]);

    let err = filter_by_metrics(&fx.params()).unwrap_err();
    assert!(matches!(
        err,
        FilterError::JoinMismatch {
            metrics_rows: 6,
            depth_rows: 2
        }
    ));
}

#[test]
fn backup_survives_classification_failure() {
    let fx = Fixture::new();
    // cluster 5 is missing from the label table
    let groups = "cluster_id\tgroup\n0\tgood\n1\tmua\n2\tgood\n3\tmua\n4\tgood\n";
    fs::write(fx.path().join("cluster_group.tsv"), groups).unwrap();

    let err = filter_by_metrics(&fx.params()).unwrap_err();
    assert!(matches!(err, FilterError::MissingLabel { cluster_id: 5, .. }));

    let backup = fs::read_to_string(fx.path().join("cluster_group_original.tsv")).unwrap();
    assert_eq!(backup, groups.replacen("group", "original_group", 1));
    // canonical table untouched
    assert_eq!(
        fs::read_to_string(fx.path().join("cluster_group.tsv")).unwrap(),
        groups
    );
}

#[test]
fn incomplete_metrics_row_is_fatal() {
    let fx = Fixture::new();
    fs::write(
        fx.path().join("waveform_metrics.csv"),
        WAVEFORM_METRICS.replace("4,4,5.5,0.40,0.05", "4,4,,0.40,0.05"),
    )
    .unwrap();

    let err = filter_by_metrics(&fx.params()).unwrap_err();
    assert!(matches!(
        err,
        FilterError::IncompleteMetrics { field: "snr", .. }
    ));

    let backup = fs::read_to_string(fx.path().join("cluster_group_original.tsv")).unwrap();
    assert_eq!(backup, CLUSTER_GROUP.replacen("group", "original_group", 1));
    assert_eq!(
        fs::read_to_string(fx.path().join("cluster_group.tsv")).unwrap(),
        CLUSTER_GROUP
    );
}

#[test]
fn second_run_backs_up_first_run_labels() {
    let fx = Fixture::new();
    filter_by_metrics(&fx.params()).unwrap();
    let after_first = fs::read_to_string(fx.path().join("cluster_group.tsv")).unwrap();

    filter_by_metrics(&fx.params()).unwrap();
    let backup = fs::read_to_string(fx.path().join("cluster_group_original.tsv")).unwrap();
    assert_eq!(backup, after_first.replacen("group", "original_group", 1));
}
