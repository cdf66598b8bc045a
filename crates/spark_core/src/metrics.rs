//! Metrics Vector - the continuous "mood" state that steers the companion
//!
//! Every behavioral decision downstream (voice, phase, ritual) is a pure
//! function of this vector. The vector is produced by an external signal
//! extractor, so nothing about it can be trusted: any field may be missing,
//! out of range, or non-finite. Absent fields fall back to documented
//! defaults; present fields are sanitized and clamped before use.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Replace NaN/Inf with the field default, then clamp into the field's range.
#[inline]
fn sanitize(metric: Metric, v: f32) -> f32 {
    let (lo, hi) = metric.range();
    if !v.is_finite() {
        tracing::debug!("Non-finite value for {}, using default {}", metric, metric.default_value());
        return metric.default_value();
    }
    if v < lo || v > hi {
        tracing::debug!("{}={} outside [{}, {}], clamping", metric, v, lo, hi);
    }
    v.clamp(lo, hi)
}

/// Lenient deserializer: a non-finite number becomes "absent" instead of
/// failing the whole document.
fn deserialize_safe_metric<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.filter(|v| v.is_finite()).map(|v| v as f32))
}

/// Lenient counter: accepts any finite number, clamps below at 0 and rounds.
fn deserialize_safe_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, u32::MAX as f64).round() as u32))
}

// =============================================================================
// Metric identifiers
// =============================================================================

/// Named dimension of the metrics vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Trust,
    Clarity,
    Pain,
    Drift,
    Chaos,
    Echo,
    SilenceMass,
    MirrorSync,
    /// The only field on a 0–100 scale.
    Rhythm,
    Interrupt,
    ContextSwitch,
    /// Consecutive high-pain cycles, an integer count.
    PainCycles,
}

impl Metric {
    pub const ALL: [Metric; 12] = [
        Metric::Trust,
        Metric::Clarity,
        Metric::Pain,
        Metric::Drift,
        Metric::Chaos,
        Metric::Echo,
        Metric::SilenceMass,
        Metric::MirrorSync,
        Metric::Rhythm,
        Metric::Interrupt,
        Metric::ContextSwitch,
        Metric::PainCycles,
    ];

    /// Value used when the field is absent (or non-finite).
    pub fn default_value(self) -> f32 {
        match self {
            Metric::Trust => 1.0,
            Metric::Clarity => 0.5,
            Metric::Pain => 0.0,
            Metric::Drift => 0.0,
            Metric::Chaos => 0.3,
            Metric::Echo => 0.0,
            Metric::SilenceMass => 0.0,
            Metric::MirrorSync => 0.5,
            Metric::Rhythm => 50.0,
            Metric::Interrupt => 0.0,
            Metric::ContextSwitch => 0.0,
            Metric::PainCycles => 0.0,
        }
    }

    /// Valid numeric range (inclusive).
    pub fn range(self) -> (f32, f32) {
        match self {
            Metric::Rhythm => (0.0, 100.0),
            Metric::PainCycles => (0.0, u32::MAX as f32),
            _ => (0.0, 1.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Metric::Trust => "trust",
            Metric::Clarity => "clarity",
            Metric::Pain => "pain",
            Metric::Drift => "drift",
            Metric::Chaos => "chaos",
            Metric::Echo => "echo",
            Metric::SilenceMass => "silenceMass",
            Metric::MirrorSync => "mirrorSync",
            Metric::Rhythm => "rhythm",
            Metric::Interrupt => "interrupt",
            Metric::ContextSwitch => "contextSwitch",
            Metric::PainCycles => "painCycles",
        }
    }

    /// Parse both camelCase and snake_case spellings.
    pub fn parse(name: &str) -> Option<Metric> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        Metric::ALL
            .into_iter()
            .find(|m| m.name().to_ascii_lowercase() == normalized)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Metrics Vector
// =============================================================================

/// Normalized multi-dimensional state. No field is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsVector {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_safe_metric")]
    pub trust: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_safe_metric")]
    pub clarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_safe_metric")]
    pub pain: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_safe_metric")]
    pub drift: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_safe_metric")]
    pub chaos: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_safe_metric")]
    pub echo: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_safe_metric")]
    pub silence_mass: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_safe_metric")]
    pub mirror_sync: Option<f32>,
    /// 0–100 scale.
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_safe_metric")]
    pub rhythm: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_safe_metric")]
    pub interrupt: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_safe_metric")]
    pub context_switch: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_safe_count")]
    pub pain_cycles: Option<u32>,
}

impl MetricsVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every field present at its default value.
    pub fn baseline() -> Self {
        Metric::ALL
            .into_iter()
            .fold(Self::default(), |v, m| v.with(m, m.default_value()))
    }

    /// The "ideal" state used as the reference for stored resonance scores.
    pub fn ideal() -> Self {
        Self::default()
            .with(Metric::Trust, 1.0)
            .with(Metric::Clarity, 1.0)
            .with(Metric::Pain, 0.0)
            .with(Metric::Drift, 0.0)
            .with(Metric::Chaos, 0.2)
            .with(Metric::Echo, 0.3)
            .with(Metric::SilenceMass, 0.1)
            .with(Metric::MirrorSync, 1.0)
            .with(Metric::Rhythm, 60.0)
            .with(Metric::Interrupt, 0.0)
            .with(Metric::ContextSwitch, 0.0)
    }

    fn raw(&self, metric: Metric) -> Option<f32> {
        match metric {
            Metric::Trust => self.trust,
            Metric::Clarity => self.clarity,
            Metric::Pain => self.pain,
            Metric::Drift => self.drift,
            Metric::Chaos => self.chaos,
            Metric::Echo => self.echo,
            Metric::SilenceMass => self.silence_mass,
            Metric::MirrorSync => self.mirror_sync,
            Metric::Rhythm => self.rhythm,
            Metric::Interrupt => self.interrupt,
            Metric::ContextSwitch => self.context_switch,
            Metric::PainCycles => self.pain_cycles.map(|c| c as f32),
        }
    }

    /// Present value, sanitized and clamped. `None` when the field is absent.
    pub fn get(&self, metric: Metric) -> Option<f32> {
        self.raw(metric).map(|v| sanitize(metric, v))
    }

    /// Present-or-default value, always in the metric's range.
    pub fn value(&self, metric: Metric) -> f32 {
        self.get(metric).unwrap_or_else(|| metric.default_value())
    }

    /// Like [`value`](Self::value) but with rhythm rescaled to 0–1.
    pub fn normalized(&self, metric: Metric) -> f32 {
        match metric {
            Metric::Rhythm => self.value(metric) / 100.0,
            _ => self.value(metric),
        }
    }

    /// Builder-style setter. Values are stored as given; clamping happens on read.
    pub fn with(mut self, metric: Metric, value: f32) -> Self {
        self.set(metric, Some(value));
        self
    }

    pub fn set(&mut self, metric: Metric, value: Option<f32>) {
        match metric {
            Metric::Trust => self.trust = value,
            Metric::Clarity => self.clarity = value,
            Metric::Pain => self.pain = value,
            Metric::Drift => self.drift = value,
            Metric::Chaos => self.chaos = value,
            Metric::Echo => self.echo = value,
            Metric::SilenceMass => self.silence_mass = value,
            Metric::MirrorSync => self.mirror_sync = value,
            Metric::Rhythm => self.rhythm = value,
            Metric::Interrupt => self.interrupt = value,
            Metric::ContextSwitch => self.context_switch = value,
            Metric::PainCycles => {
                self.pain_cycles = value
                    .filter(|v| v.is_finite())
                    .map(|v| v.max(0.0).round() as u32)
            }
        }
    }

    /// Copy with every present field sanitized and clamped.
    pub fn sanitized(&self) -> Self {
        let mut out = Self::default();
        for metric in Metric::ALL {
            out.set(metric, self.get(metric));
        }
        out
    }

    /// Number of fields actually present.
    pub fn present_count(&self) -> usize {
        Metric::ALL
            .into_iter()
            .filter(|m| self.raw(*m).is_some())
            .count()
    }
}

// =============================================================================
// Shared threshold predicate
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl Comparison {
    pub fn holds(self, value: f32, threshold: f32) -> bool {
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Ge => value >= threshold,
            Comparison::Lt => value < threshold,
            Comparison::Le => value <= threshold,
        }
    }
}

/// `metric <cmp> threshold`, the building block of every rule table.
///
/// Thresholds for rhythm are expressed on its native 0–100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub metric: Metric,
    pub comparison: Comparison,
    pub threshold: f32,
}

impl Condition {
    pub const fn new(metric: Metric, comparison: Comparison, threshold: f32) -> Self {
        Self { metric, comparison, threshold }
    }

    /// Evaluate with defaults filling absent fields.
    pub fn holds(&self, metrics: &MetricsVector) -> bool {
        self.comparison.holds(metrics.value(self.metric), self.threshold)
    }

    /// Evaluate only if the field is present; absent fields never match.
    pub fn holds_present(&self, metrics: &MetricsVector) -> bool {
        metrics
            .get(self.metric)
            .is_some_and(|v| self.comparison.holds(v, self.threshold))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.comparison {
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
        };
        write!(f, "{} {} {}", self.metric, op, self.threshold)
    }
}
