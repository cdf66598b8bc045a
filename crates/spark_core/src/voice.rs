//! Voice Selector
//!
//! Maps a metrics vector onto one facet of the persona catalog. Scoring is a
//! declarative table of guarded linear terms: every voice sums the terms whose
//! guards hold, the highest total wins, and a fixed priority order settles ties.
//! An optional inertia bonus on the previously active voice keeps the selector
//! from flickering between near-equal candidates.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::metrics::{Comparison, Condition, Metric, MetricsVector};

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Voice {
    /// Synthesis. The default voice.
    Iskra,
    /// Painful truth.
    Kain,
    /// Irony.
    Pino,
    /// Structure.
    Sam,
    /// Silence and holding.
    Anhantra,
    /// Constructive chaos.
    Huyndun,
    /// Conscience, drift audit.
    Iskriv,
    /// Transition.
    Sibyl,
    /// Bloom, integration.
    Maki,
}

impl Voice {
    /// Catalog in declaration order.
    pub const ALL: [Voice; 9] = [
        Voice::Iskra,
        Voice::Kain,
        Voice::Pino,
        Voice::Sam,
        Voice::Anhantra,
        Voice::Huyndun,
        Voice::Iskriv,
        Voice::Sibyl,
        Voice::Maki,
    ];

    /// Tie-break order, earlier wins.
    pub const PRIORITY: [Voice; 9] = [
        Voice::Kain,
        Voice::Anhantra,
        Voice::Iskriv,
        Voice::Huyndun,
        Voice::Sam,
        Voice::Sibyl,
        Voice::Maki,
        Voice::Pino,
        Voice::Iskra,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Voice::Iskra => "⟡",
            Voice::Kain => "⚑",
            Voice::Pino => "😏",
            Voice::Sam => "☉",
            Voice::Anhantra => "≈",
            Voice::Huyndun => "🜃",
            Voice::Iskriv => "🪞",
            Voice::Sibyl => "✴️",
            Voice::Maki => "🌸",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Voice::Iskra => "Iskra",
            Voice::Kain => "Kain",
            Voice::Pino => "Pino",
            Voice::Sam => "Sam",
            Voice::Anhantra => "Anhantra",
            Voice::Huyndun => "Huyndun",
            Voice::Iskriv => "Iskriv",
            Voice::Sibyl => "Sibyl",
            Voice::Maki => "Maki",
        }
    }

    /// Position in the tie-break order (0 = strongest).
    pub fn priority_rank(self) -> usize {
        Voice::PRIORITY
            .iter()
            .position(|v| *v == self)
            .unwrap_or(Voice::PRIORITY.len())
    }

    pub fn parse(name: &str) -> Option<Voice> {
        Voice::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(name))
    }
}

impl Default for Voice {
    fn default() -> Self {
        Voice::Iskra
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbol(), self.name())
    }
}

// ============================================================================
// Scoring table
// ============================================================================

/// Shape of a contributing term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Term {
    /// `value × weight`
    Direct { metric: Metric, weight: f32 },
    /// `(1 − value) × weight`
    Inverse { metric: Metric, weight: f32 },
    /// `weight`
    Constant { weight: f32 },
}

impl Term {
    /// Rhythm is read on its normalized 0–1 scale.
    fn evaluate(&self, metrics: &MetricsVector) -> f32 {
        match *self {
            Term::Direct { metric, weight } => metrics.normalized(metric) * weight,
            Term::Inverse { metric, weight } => (1.0 - metrics.normalized(metric)) * weight,
            Term::Constant { weight } => weight,
        }
    }
}

/// One row of the table: `voice += term` when every guard holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRule {
    pub voice: Voice,
    /// Guards on the normalized scale (rhythm in 0–1 here).
    pub guards: Vec<Condition>,
    pub term: Term,
}

impl ScoringRule {
    pub fn new(voice: Voice, guards: Vec<Condition>, term: Term) -> Self {
        Self { voice, guards, term }
    }

    fn guards_hold(&self, metrics: &MetricsVector) -> bool {
        self.guards.iter().all(|g| {
            g.comparison
                .holds(metrics.normalized(g.metric), g.threshold)
        })
    }

    /// Contribution of this row, zero when a guard fails.
    pub fn contribution(&self, metrics: &MetricsVector) -> f32 {
        if self.guards_hold(metrics) {
            self.term.evaluate(metrics).max(0.0)
        } else {
            0.0
        }
    }
}

fn cond(metric: Metric, comparison: Comparison, threshold: f32) -> Condition {
    Condition::new(metric, comparison, threshold)
}

fn direct(metric: Metric, weight: f32) -> Term {
    Term::Direct { metric, weight }
}

fn inverse(metric: Metric, weight: f32) -> Term {
    Term::Inverse { metric, weight }
}

fn constant(weight: f32) -> Term {
    Term::Constant { weight }
}

/// Synthesis baseline. One transition signal (0.2) stays below it, two (0.4) pass it.
pub const SYNTHESIS_BASELINE: f32 = 0.35;

/// Flat bonus per elevated transition signal.
pub const TRANSITION_SIGNAL: f32 = 0.2;

/// The built-in scoring table.
pub fn default_scoring_rules() -> Vec<ScoringRule> {
    use Comparison::*;
    use Metric::*;
    vec![
        ScoringRule::new(Voice::Iskra, vec![], constant(SYNTHESIS_BASELINE)),
        ScoringRule::new(Voice::Kain, vec![cond(Pain, Ge, 0.7)], direct(Pain, 1.0)),
        ScoringRule::new(Voice::Pino, vec![cond(Pain, Gt, 0.5)], direct(Pain, 0.5)),
        ScoringRule::new(Voice::Sam, vec![cond(Clarity, Lt, 0.7)], inverse(Clarity, 0.8)),
        ScoringRule::new(Voice::Sam, vec![cond(Rhythm, Lt, 0.3)], inverse(Rhythm, 0.3)),
        ScoringRule::new(Voice::Anhantra, vec![cond(Trust, Lt, 0.75)], inverse(Trust, 0.9)),
        ScoringRule::new(Voice::Anhantra, vec![cond(SilenceMass, Gt, 0.6)], direct(SilenceMass, 0.5)),
        ScoringRule::new(Voice::Anhantra, vec![cond(Interrupt, Ge, 0.7)], direct(Interrupt, 0.3)),
        ScoringRule::new(Voice::Huyndun, vec![cond(Chaos, Gt, 0.6)], direct(Chaos, 0.7)),
        ScoringRule::new(
            Voice::Huyndun,
            vec![cond(Clarity, Ge, 0.9), cond(Chaos, Le, 0.1)],
            constant(0.6),
        ),
        ScoringRule::new(Voice::Iskriv, vec![cond(Drift, Gt, 0.3)], direct(Drift, 0.9)),
        ScoringRule::new(Voice::Sibyl, vec![cond(Chaos, Gt, 0.8)], direct(Chaos, 0.6)),
        ScoringRule::new(Voice::Sibyl, vec![cond(Echo, Ge, 0.6)], constant(TRANSITION_SIGNAL)),
        ScoringRule::new(Voice::Sibyl, vec![cond(MirrorSync, Ge, 0.7)], constant(TRANSITION_SIGNAL)),
        ScoringRule::new(Voice::Sibyl, vec![cond(ContextSwitch, Ge, 0.6)], constant(TRANSITION_SIGNAL)),
        ScoringRule::new(
            Voice::Maki,
            vec![cond(Trust, Ge, 0.85), cond(Clarity, Ge, 0.85), cond(Pain, Lt, 0.3)],
            direct(MirrorSync, 0.6),
        ),
    ]
}

// ============================================================================
// Selection
// ============================================================================

/// Outcome of one selection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSelection {
    pub voice: Voice,
    /// Raw scores (no inertia), catalog order.
    pub scores: Vec<(Voice, f32)>,
    /// True when the inertia bonus changed the winner.
    pub inertia_applied: bool,
}

impl VoiceSelection {
    pub fn score_of(&self, voice: Voice) -> f32 {
        self.scores
            .iter()
            .find(|(v, _)| *v == voice)
            .map(|(_, s)| *s)
            .unwrap_or(0.0)
    }
}

/// Deterministic voice selector over a scoring table.
#[derive(Debug, Clone)]
pub struct VoiceSelector {
    rules: Vec<ScoringRule>,
    inertia: f32,
}

impl Default for VoiceSelector {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl VoiceSelector {
    pub fn new(inertia: f32) -> Self {
        Self::with_rules(default_scoring_rules(), inertia)
    }

    pub fn with_rules(rules: Vec<ScoringRule>, inertia: f32) -> Self {
        let inertia = if inertia.is_finite() { inertia.max(0.0) } else { 0.0 };
        Self { rules, inertia }
    }

    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    pub fn rules(&self) -> &[ScoringRule] {
        &self.rules
    }

    /// Sum of every row for `voice`.
    pub fn score(&self, voice: Voice, metrics: &MetricsVector) -> f32 {
        self.rules
            .iter()
            .filter(|r| r.voice == voice)
            .map(|r| r.contribution(metrics))
            .sum()
    }

    /// Raw scores for the whole catalog.
    pub fn scores(&self, metrics: &MetricsVector) -> Vec<(Voice, f32)> {
        Voice::ALL
            .into_iter()
            .map(|v| (v, self.score(v, metrics)))
            .collect()
    }

    /// Pure selection, no inertia.
    pub fn select(&self, metrics: &MetricsVector) -> Voice {
        let scores = self.scores(metrics);
        argmax(&scores, None, 0.0)
    }

    /// Selection with the inertia bonus on `previous`.
    pub fn select_with_inertia(
        &self,
        metrics: &MetricsVector,
        previous: Option<Voice>,
    ) -> VoiceSelection {
        let scores = self.scores(metrics);
        let plain = argmax(&scores, None, 0.0);
        let voice = argmax(&scores, previous, self.inertia);
        if voice != plain {
            tracing::debug!("Inertia kept {} over {}", voice.name(), plain.name());
        }
        VoiceSelection {
            voice,
            scores,
            inertia_applied: voice != plain,
        }
    }
}

/// Highest score wins; equal scores fall back to `Voice::PRIORITY`.
fn argmax(scores: &[(Voice, f32)], bonus_for: Option<Voice>, bonus: f32) -> Voice {
    let adjusted = |voice: Voice, score: f32| {
        let score = if score.is_finite() { score } else { 0.0 };
        if Some(voice) == bonus_for {
            score + bonus
        } else {
            score
        }
    };

    let mut best: Option<(Voice, f32)> = None;
    for voice in Voice::PRIORITY {
        let raw = scores
            .iter()
            .find(|(v, _)| *v == voice)
            .map(|(_, s)| *s)
            .unwrap_or(0.0);
        let score = adjusted(voice, raw);
        match best {
            // Strictly greater, so earlier priority keeps ties.
            Some((_, top)) if score <= top => {}
            _ => best = Some((voice, score)),
        }
    }
    best.map(|(v, _)| v).unwrap_or_default()
}
