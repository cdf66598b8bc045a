//! Resonance Ranker
//!
//! Resonance is a weighted L1 similarity between a node's stored metrics
//! snapshot and a reference vector, with mirror-sync counted double and a
//! penalty for drift in the stored snapshot. The same formula, evaluated
//! against [`MetricsVector::ideal`], gives the score stored on a node at
//! write time.

use serde::{Deserialize, Serialize};
use spark_core::{Metric, MetricsVector};

use crate::graph::{GraphView, MemoryNode};

/// `(metric, weight)` pairs of the similarity measure.
pub const RESONANCE_WEIGHTS: [(Metric, f32); 9] = [
    (Metric::Trust, 1.0),
    (Metric::Clarity, 1.0),
    (Metric::Pain, 1.0),
    (Metric::Drift, 1.0),
    (Metric::Chaos, 1.0),
    (Metric::Echo, 0.5),
    (Metric::SilenceMass, 0.5),
    (Metric::MirrorSync, 2.0),
    (Metric::Rhythm, 0.5),
];

/// Subtracted per unit of drift in the stored snapshot.
pub const DRIFT_PENALTY: f32 = 0.2;

/// `1 − Σ wᵢ·|sᵢ − rᵢ| / Σ wᵢ`, always in [0, 1]. Rhythm is compared on 0–1.
pub fn similarity(snapshot: &MetricsVector, reference: &MetricsVector) -> f32 {
    let (dist, total) = RESONANCE_WEIGHTS
        .iter()
        .fold((0.0f32, 0.0f32), |(dist, total), &(metric, w)| {
            let d = (snapshot.normalized(metric) - reference.normalized(metric)).abs();
            (dist + w * d, total + w)
        });
    (1.0 - dist / total).clamp(0.0, 1.0)
}

/// Similarity minus the drift penalty, clamped to [0, 1].
pub fn resonance_score(snapshot: &MetricsVector, reference: &MetricsVector) -> f32 {
    let penalty = DRIFT_PENALTY * snapshot.value(Metric::Drift);
    (similarity(snapshot, reference) - penalty).clamp(0.0, 1.0)
}

/// Score stored on a node at write time.
pub fn ideal_resonance(snapshot: &MetricsVector) -> f32 {
    resonance_score(snapshot, &MetricsVector::ideal())
}

/// Options for [`ResonanceRanker::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResonanceQuery {
    /// Scored nodes below this are dropped.
    pub threshold: f32,
    /// Append nodes without a snapshot after the scored ones.
    pub include_unscored: bool,
    pub limit: Option<usize>,
}

impl Default for ResonanceQuery {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            include_unscored: false,
            limit: None,
        }
    }
}

impl ResonanceQuery {
    pub fn with_threshold(threshold: f32) -> Self {
        Self { threshold, ..Self::default() }
    }
}

/// A ranked node. `score` is `None` for nodes without a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNode {
    pub node: MemoryNode,
    pub score: Option<f32>,
}

pub struct ResonanceRanker;

impl ResonanceRanker {
    /// Score every node against `reference`, highest first.
    ///
    /// The sort is stable, so equal scores keep insertion order.
    pub fn rank(view: &GraphView, reference: &MetricsVector, query: &ResonanceQuery) -> Vec<ScoredNode> {
        let threshold = if query.threshold.is_finite() { query.threshold } else { 0.0 };
        let reference = reference.sanitized();

        let mut scored: Vec<ScoredNode> = Vec::new();
        let mut unscored: Vec<ScoredNode> = Vec::new();
        for node in view.nodes() {
            match &node.metrics_snapshot {
                Some(snapshot) => {
                    let score = resonance_score(snapshot, &reference);
                    if score >= threshold {
                        scored.push(ScoredNode { node: node.clone(), score: Some(score) });
                    }
                }
                None if query.include_unscored => {
                    unscored.push(ScoredNode { node: node.clone(), score: None });
                }
                None => {}
            }
        }

        scored.sort_by(|a, b| {
            let sa = a.score.unwrap_or(0.0);
            let sb = b.score.unwrap_or(0.0);
            sb.total_cmp(&sa)
        });
        scored.extend(unscored);
        if let Some(limit) = query.limit {
            scored.truncate(limit);
        }
        scored
    }
}
