//! Ritual Trigger Detection
//!
//! Watches metric trajectories against a rule table and emits trigger events
//! when a corrective reset is due. Detection is read-only: it never touches
//! the metrics or the graph. Acting on an event belongs to the executor
//! outside this crate, which is expected to apply the ritual's advertised
//! adjustments and write a record back into the memory graph.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::metrics::{Comparison, Condition, Metric, MetricsVector};

// ============================================================================
// Ritual catalog
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RitualKind {
    Watch,
    Dream,
    Shatter,
    Council,
    Dreamspace,
    Mirror,
    Anchor,
}

/// What an executor should do to one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Adjustment {
    Delta { metric: Metric, amount: f32 },
    Reset { metric: Metric, value: f32 },
}

impl Adjustment {
    /// Apply to a vector, clamping into range. Provided for executors and tests.
    pub fn apply(&self, metrics: &mut MetricsVector) {
        match *self {
            Adjustment::Delta { metric, amount } => {
                let (lo, hi) = metric.range();
                let v = (metrics.value(metric) + amount).clamp(lo, hi);
                metrics.set(metric, Some(v));
            }
            Adjustment::Reset { metric, value } => metrics.set(metric, Some(value)),
        }
    }
}

impl RitualKind {
    pub const ALL: [RitualKind; 7] = [
        RitualKind::Watch,
        RitualKind::Dream,
        RitualKind::Shatter,
        RitualKind::Council,
        RitualKind::Dreamspace,
        RitualKind::Mirror,
        RitualKind::Anchor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RitualKind::Watch => "Watch",
            RitualKind::Dream => "Dream",
            RitualKind::Shatter => "Shatter",
            RitualKind::Council => "Council",
            RitualKind::Dreamspace => "Dreamspace",
            RitualKind::Mirror => "Mirror",
            RitualKind::Anchor => "Anchor",
        }
    }

    /// Adjustments the executor is expected to apply. Data only.
    pub fn adjustments(self) -> Vec<Adjustment> {
        use Adjustment::*;
        use Metric::*;
        match self {
            RitualKind::Watch => vec![
                Delta { metric: Clarity, amount: 0.15 },
                Delta { metric: Drift, amount: -0.1 },
            ],
            RitualKind::Dream => vec![
                Delta { metric: Clarity, amount: 0.2 },
                Delta { metric: Chaos, amount: -0.05 },
            ],
            RitualKind::Mirror => vec![
                Delta { metric: MirrorSync, amount: 0.25 },
                Delta { metric: Trust, amount: 0.1 },
            ],
            RitualKind::Anchor => vec![
                Delta { metric: Drift, amount: -0.3 },
                Delta { metric: Chaos, amount: -0.25 },
                Delta { metric: Trust, amount: 0.15 },
            ],
            RitualKind::Shatter => vec![
                Reset { metric: Drift, value: 0.0 },
                Reset { metric: Pain, value: 0.0 },
            ],
            RitualKind::Council | RitualKind::Dreamspace => Vec::new(),
        }
    }
}

impl fmt::Display for RitualKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Rule table
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RitualRule {
    pub name: String,
    pub condition: Condition,
    /// Consecutive evaluations, the current one included, on which the condition must hold.
    pub sustain: usize,
    pub ritual: RitualKind,
    /// Higher fires first.
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RitualRule {
    pub fn new(
        name: &str,
        condition: Condition,
        sustain: usize,
        ritual: RitualKind,
        priority: i32,
    ) -> Self {
        Self {
            name: name.to_string(),
            condition,
            sustain: sustain.max(1),
            ritual,
            priority,
            enabled: true,
        }
    }
}

/// Built-in trigger table.
pub fn default_ritual_rules() -> Vec<RitualRule> {
    use Comparison::*;
    use Metric::*;
    let c = Condition::new;
    vec![
        RitualRule::new("pain_shatter", c(Pain, Gt, 0.85), 2, RitualKind::Shatter, 10),
        RitualRule::new("chaos_anchor", c(Chaos, Gt, 0.8), 1, RitualKind::Anchor, 9),
        RitualRule::new("drift_watch", c(Drift, Gt, 0.7), 1, RitualKind::Watch, 8),
        RitualRule::new("mirror_desync", c(MirrorSync, Lt, 0.4), 1, RitualKind::Mirror, 7),
        RitualRule::new("clarity_dream", c(Clarity, Lt, 0.3), 1, RitualKind::Dream, 6),
    ]
}

/// Event handed to the ritual executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RitualTrigger {
    pub rule: String,
    pub ritual: RitualKind,
    pub priority: i32,
    pub metric: Metric,
    /// Current value that tripped the rule.
    pub value: f32,
    pub adjustments: Vec<Adjustment>,
}

// ============================================================================
// Detector
// ============================================================================

#[derive(Debug, Clone)]
pub struct RitualTriggerDetector {
    rules: Vec<RitualRule>,
}

impl Default for RitualTriggerDetector {
    fn default() -> Self {
        Self::with_rules(default_ritual_rules())
    }
}

impl RitualTriggerDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table. Priority ordering is decided at detection time.
    pub fn with_rules(rules: Vec<RitualRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RitualRule] {
        &self.rules
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.rules.iter_mut().find(|r| r.name == name) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Evaluate `current` against the table.
    ///
    /// `history` holds earlier evaluations, oldest first, not including
    /// `current`. Only fields present in a vector count; an absent field
    /// never fires.
    pub fn detect(&self, current: &MetricsVector, history: &[MetricsVector]) -> Vec<RitualTrigger> {
        let mut fired: Vec<(usize, RitualTrigger)> = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.enabled)
            .filter(|(_, rule)| Self::sustained(rule, current, history))
            .filter_map(|(idx, rule)| {
                let value = current.get(rule.condition.metric)?;
                Some((
                    idx,
                    RitualTrigger {
                        rule: rule.name.clone(),
                        ritual: rule.ritual,
                        priority: rule.priority,
                        metric: rule.condition.metric,
                        value,
                        adjustments: rule.ritual.adjustments(),
                    },
                ))
            })
            .collect();

        // Priority descending, table order on ties.
        fired.sort_by(|(ia, a), (ib, b)| b.priority.cmp(&a.priority).then(ia.cmp(ib)));

        for (_, t) in &fired {
            tracing::info!("Ritual trigger: {} -> {} ({}={:.2})", t.rule, t.ritual, t.metric, t.value);
        }
        fired.into_iter().map(|(_, t)| t).collect()
    }

    fn sustained(rule: &RitualRule, current: &MetricsVector, history: &[MetricsVector]) -> bool {
        let needed = rule.sustain.max(1);
        if !rule.condition.holds_present(current) {
            return false;
        }
        let past = needed - 1;
        if history.len() < past {
            return false;
        }
        history
            .iter()
            .rev()
            .take(past)
            .all(|m| rule.condition.holds_present(m))
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Detector plus a bounded trailing window, fed one vector per evaluation.
#[derive(Debug, Clone)]
pub struct RitualMonitor {
    detector: RitualTriggerDetector,
    history: VecDeque<MetricsVector>,
    max_history: usize,
}

impl RitualMonitor {
    pub fn new(detector: RitualTriggerDetector, max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            detector,
            history: VecDeque::with_capacity(max_history),
            max_history,
        }
    }

    pub fn detector(&self) -> &RitualTriggerDetector {
        &self.detector
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Detect against the window, then push `metrics` into it.
    pub fn observe(&mut self, metrics: &MetricsVector) -> Vec<RitualTrigger> {
        let window: Vec<MetricsVector> = self.history.iter().cloned().collect();
        let triggers = self.detector.detect(metrics, &window);
        if self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(metrics.sanitized());
        triggers
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl Default for RitualMonitor {
    fn default() -> Self {
        Self::new(RitualTriggerDetector::default(), 16)
    }
}
