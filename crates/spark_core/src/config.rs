use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SparkConfig {
    pub voice: VoiceConfig,
    pub graph: GraphConfig,
    pub rituals: RitualConfig,
    pub persistence: PersistenceConfig,
}

impl SparkConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: SparkConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file is missing or invalid, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    /// Unparseable values are ignored.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SPARK_VOICE_INERTIA") {
            if let Ok(x) = v.parse::<f32>() {
                if x.is_finite() {
                    self.voice.inertia = x.max(0.0);
                }
            }
        }
        if let Ok(v) = std::env::var("SPARK_PERSISTENCE_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "json" => self.persistence.backend = PersistenceBackend::Json,
                "sqlite" => self.persistence.backend = PersistenceBackend::Sqlite,
                other => tracing::warn!("Ignoring unknown SPARK_PERSISTENCE_BACKEND={}", other),
            }
        }
        if let Ok(v) = std::env::var("SPARK_PERSISTENCE_PATH") {
            if !v.is_empty() {
                self.persistence.path = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("SPARK_MAX_TRAVERSAL_DEPTH") {
            if let Ok(n) = v.parse() {
                self.graph.max_traversal_depth = n;
            }
        }
    }
}

// ============================================================================
// Voice selection
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Bonus added to the previously active voice before picking a winner.
    pub inertia: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self { inertia: 0.05 }
    }
}

// ============================================================================
// Memory graph
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Weight of SIMILARITY edges between nodes sharing layer and type.
    pub similarity_weight: f32,
    /// Maximum resonance-score gap for a RESONANCE edge.
    pub resonance_tolerance: f32,
    /// RESONANCE edges lighter than this are not created.
    pub min_resonance_weight: f32,
    /// Hard cap on requested traversal depth.
    pub max_traversal_depth: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            similarity_weight: 0.6,
            resonance_tolerance: 0.1,
            min_resonance_weight: 0.5,
            max_traversal_depth: 16,
        }
    }
}

// ============================================================================
// Rituals
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RitualConfig {
    /// Trailing evaluations kept for sustained-condition rules.
    pub history_len: usize,
}

impl Default for RitualConfig {
    fn default() -> Self {
        Self { history_len: 16 }
    }
}

// ============================================================================
// Persistence
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub backend: PersistenceBackend,
    pub path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::Json,
            path: PathBuf::from("spark_graph.json"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
