//! Metric-driven selection engine.
//!
//! A [`MetricsVector`] goes in; a voice, a phase and zero or more ritual
//! triggers come out. All three are pure functions of the vector (the voice
//! selector optionally takes the previous voice for inertia) and never fail.

pub mod config;
pub mod metrics;
pub mod phase;
pub mod ritual;
pub mod voice;

pub use config::{PersistenceBackend, SparkConfig};
pub use metrics::{Comparison, Condition, Metric, MetricsVector};
pub use phase::{Phase, PhaseClassifier, PhaseMatch, PhaseRule};
pub use ritual::{
    Adjustment, RitualKind, RitualMonitor, RitualRule, RitualTrigger, RitualTriggerDetector,
};
pub use voice::{ScoringRule, Term, Voice, VoiceSelection, VoiceSelector};

/// Voice for `metrics` alone, without inertia.
pub fn select_voice(metrics: &MetricsVector) -> Voice {
    VoiceSelector::default().select(metrics)
}

/// Phase of `metrics` under the built-in table.
pub fn classify_phase(metrics: &MetricsVector) -> Phase {
    PhaseClassifier::default().classify(metrics)
}

/// Ritual triggers under the built-in table. `history` is oldest first.
pub fn detect_ritual_triggers(
    metrics: &MetricsVector,
    history: Option<&[MetricsVector]>,
) -> Vec<RitualTrigger> {
    RitualTriggerDetector::default().detect(metrics, history.unwrap_or(&[]))
}
