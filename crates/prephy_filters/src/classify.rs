//! Metric-threshold reclassification of cluster labels.
//!
//! Each cluster runs through an ordered rule chain:
//!
//! 1. **Wide-waveform noise** (only when `halfwidth_max < wide_halfwidth_max`):
//!    `halfwidth_max < halfwidth <= wide_halfwidth_max` with
//!    `repolarization_slope < repo_slope` marks the cluster `noise`. Evaluation
//!    continues; later rules see the new label.
//! 2. **Catch-all noise**: any of low SNR, halfwidth above the wide maximum,
//!    firing rate below the MUA minimum, or depth beyond the maximum. When this
//!    matches, rules 3 and 4 are skipped.
//! 3. **MUA rescue**: a `mua` cluster with acceptable ISI violations,
//!    contamination and firing rate becomes `good`. Evaluation ends.
//! 4. **Good downgrade**: a `good` cluster with (ISI violations above the
//!    maximum and more than [`DOWNGRADE_MIN_NUM_VIOL`] violations), high
//!    contamination, or low firing rate becomes `mua`.
//!
//! The low-firing-rate term of rule 4 can never decide a cluster: rule 2
//! already sent every such cluster to `noise`. It is kept so the rule reads
//! the same as the curation protocol it implements.

use serde::Serialize;

use crate::labels::Label;
use crate::metrics::ClusterMetrics;
use crate::params::Thresholds;

/// Violation count a `good` cluster must exceed, together with the ISI
/// violation ratio, before it is downgraded.
pub const DOWNGRADE_MIN_NUM_VIOL: f64 = 3.0;

/// Which rule decided a cluster's final label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Rule 1 matched and rule 2 did not.
    WideWaveformNoise,
    /// Rule 2 matched.
    CatchAllNoise,
    /// Rule 3 promoted a `mua` cluster to `good`.
    MuaRescued,
    /// Rule 4 demoted a `good` cluster to `mua`.
    GoodDowngraded,
    /// No rule changed the label.
    Unchanged,
}

impl Outcome {
    pub fn is_noise(&self) -> bool {
        matches!(self, Outcome::WideWaveformNoise | Outcome::CatchAllNoise)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub cluster_id: u32,
    pub original: Label,
    pub label: Label,
    pub outcome: Outcome,
}

/// Label transitions accumulated over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransitionCounts {
    pub good_to_mua: usize,
    pub mua_to_good: usize,
    /// Clusters sent to noise, counted once per cluster even when both noise
    /// rules match.
    pub to_noise: usize,
}

impl TransitionCounts {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::WideWaveformNoise | Outcome::CatchAllNoise => self.to_noise += 1,
            Outcome::MuaRescued => self.mua_to_good += 1,
            Outcome::GoodDowngraded => self.good_to_mua += 1,
            Outcome::Unchanged => {}
        }
    }
}

/// Per-cluster decisions in input order, plus their transition counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub decisions: Vec<Decision>,
    pub counts: TransitionCounts,
}

impl Classification {
    pub fn assignments(&self) -> Vec<(u32, Label)> {
        self.decisions.iter().map(|d| (d.cluster_id, d.label)).collect()
    }
}

fn is_wide_flat_waveform(m: &ClusterMetrics, t: &Thresholds) -> bool {
    t.wide_check_active()
        && m.halfwidth > t.halfwidth_max
        && m.halfwidth <= t.wide_halfwidth_max
        && m.repolarization_slope < t.repo_slope
}

fn fails_noise_floor(m: &ClusterMetrics, t: &Thresholds) -> bool {
    m.snr < t.snr_min
        || m.halfwidth > t.wide_halfwidth_max
        || m.firing_rate < t.mua_fr_min
        || m.depth > t.depth_max
}

fn qualifies_for_rescue(m: &ClusterMetrics, t: &Thresholds) -> bool {
    m.isi_viol <= t.isi_viol_max
        && m.contam_rate <= t.contam_rate_max
        && m.firing_rate >= t.mua_fr_min
}

fn qualifies_for_downgrade(m: &ClusterMetrics, t: &Thresholds) -> bool {
    (m.isi_viol > t.isi_viol_max && m.num_viol > DOWNGRADE_MIN_NUM_VIOL)
        || m.contam_rate > t.contam_rate_max
        || m.firing_rate < t.mua_fr_min
}

/// Run the rule chain for one cluster.
pub fn classify_cluster(original: Label, m: &ClusterMetrics, t: &Thresholds) -> (Label, Outcome) {
    let mut label = original;
    let mut outcome = Outcome::Unchanged;

    if is_wide_flat_waveform(m, t) {
        label = Label::Noise;
        outcome = Outcome::WideWaveformNoise;
    }

    if fails_noise_floor(m, t) {
        return (Label::Noise, Outcome::CatchAllNoise);
    }

    if label == Label::Mua && qualifies_for_rescue(m, t) {
        return (Label::Good, Outcome::MuaRescued);
    }

    if label == Label::Good && qualifies_for_downgrade(m, t) {
        return (Label::Mua, Outcome::GoodDowngraded);
    }

    (label, outcome)
}

/// Classify every cluster in order. `original_label` supplies the label each
/// cluster carried before the run.
pub fn classify<E>(
    clusters: &[ClusterMetrics],
    thresholds: &Thresholds,
    mut original_label: impl FnMut(u32) -> Result<Label, E>,
) -> Result<Classification, E> {
    let mut result = Classification {
        decisions: Vec::with_capacity(clusters.len()),
        counts: TransitionCounts::default(),
    };

    for m in clusters {
        let original = original_label(m.cluster_id)?;
        let (label, outcome) = classify_cluster(original, m, thresholds);
        result.counts.record(outcome);
        result.decisions.push(Decision {
            cluster_id: m.cluster_id,
            original,
            label,
            outcome,
        });
    }

    Ok(result)
}
