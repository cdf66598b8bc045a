//! Phase Classifier
//!
//! Coarse classification of the overall state. An ordered table of threshold
//! rules is scanned top to bottom and the first rule whose conditions all hold
//! decides the phase. When nothing matches the phase is `Clarity`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::metrics::{Comparison, Condition, Metric, MetricsVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Sustained high pain (crisis).
    Darkness,
    /// Baseline.
    Clarity,
    /// Heavy drift, identity dissolving.
    Dissolution,
    /// Chaos beyond the constructive range.
    Transition,
    /// Withdrawal.
    Silence,
    /// Repetition of earlier material.
    Echo,
    /// Breaking out of stagnation.
    Experiment,
    /// Integration.
    Realization,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Darkness,
        Phase::Clarity,
        Phase::Dissolution,
        Phase::Transition,
        Phase::Silence,
        Phase::Echo,
        Phase::Experiment,
        Phase::Realization,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Darkness => "Darkness",
            Phase::Clarity => "Clarity",
            Phase::Dissolution => "Dissolution",
            Phase::Transition => "Transition",
            Phase::Silence => "Silence",
            Phase::Echo => "Echo",
            Phase::Experiment => "Experiment",
            Phase::Realization => "Realization",
        }
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Clarity
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of the decision table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRule {
    pub phase: Phase,
    /// All must hold. Thresholds are on each metric's native scale.
    pub conditions: Vec<Condition>,
}

impl PhaseRule {
    pub fn new(phase: Phase, conditions: Vec<Condition>) -> Self {
        Self { phase, conditions }
    }

    pub fn matches(&self, metrics: &MetricsVector) -> bool {
        self.conditions.iter().all(|c| c.holds(metrics))
    }
}

/// The literal ordered table. Order is significant.
pub fn default_phase_rules() -> Vec<PhaseRule> {
    use Comparison::*;
    use Metric::*;
    let c = Condition::new;
    vec![
        PhaseRule::new(Phase::Darkness, vec![c(Pain, Ge, 0.7), c(PainCycles, Ge, 2.0)]),
        PhaseRule::new(Phase::Dissolution, vec![c(Drift, Ge, 0.8)]),
        PhaseRule::new(Phase::Transition, vec![c(Chaos, Gt, 0.8)]),
        PhaseRule::new(Phase::Silence, vec![c(SilenceMass, Gt, 0.6)]),
        PhaseRule::new(Phase::Echo, vec![c(Echo, Ge, 0.6)]),
        PhaseRule::new(Phase::Experiment, vec![c(Clarity, Ge, 0.9), c(Chaos, Le, 0.1)]),
        PhaseRule::new(
            Phase::Realization,
            vec![c(Trust, Ge, 0.85), c(Clarity, Ge, 0.85), c(MirrorSync, Ge, 0.8)],
        ),
    ]
}

/// Result of [`PhaseClassifier::classify_detailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseMatch {
    pub phase: Phase,
    /// Index of the matching row, `None` for the default.
    pub rule_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PhaseClassifier {
    rules: Vec<PhaseRule>,
}

impl Default for PhaseClassifier {
    fn default() -> Self {
        Self::with_rules(default_phase_rules())
    }
}

impl PhaseClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<PhaseRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[PhaseRule] {
        &self.rules
    }

    pub fn classify(&self, metrics: &MetricsVector) -> Phase {
        self.classify_detailed(metrics).phase
    }

    pub fn classify_detailed(&self, metrics: &MetricsVector) -> PhaseMatch {
        self.rules
            .iter()
            .position(|r| r.matches(metrics))
            .map(|i| PhaseMatch { phase: self.rules[i].phase, rule_index: Some(i) })
            .unwrap_or(PhaseMatch { phase: Phase::Clarity, rule_index: None })
    }
}
