//! Session Coordinator - wires the selection engine to the memory graph
//!
//! One coordinator drives one conversation session:
//! - Evaluation: metrics → voice, phase and ritual triggers
//! - Observation: evaluation plus an L2 node and its auto-built connections
//! - Ritual records: L1 nodes linked causally to what provoked them
//! - Recall: resonance ranking against a fresh vector
//! - Checkpoint/restore through a persistence adapter

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use spark_core::{
    MetricsVector, Phase, PhaseClassifier, RitualMonitor, RitualTrigger, RitualTriggerDetector,
    SparkConfig, Voice, VoiceSelector,
};

use crate::error::GraphResult;
use crate::graph::{EdgeType, Layer, MemoryEdge, NodeDraft};
use crate::persistence::GraphPersistence;
use crate::resonance::{ResonanceQuery, ScoredNode};
use crate::store::GraphStore;

pub const RITUAL_NODE_TYPE: &str = "ritual";

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub voice: Voice,
    pub phase: Phase,
    pub triggers: Vec<RitualTrigger>,
    /// The previous voice was kept only because of inertia.
    pub inertia_applied: bool,
}

/// Result of [`SessionCoordinator::observe`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub evaluation: Evaluation,
    pub node_id: String,
    pub edges: Vec<MemoryEdge>,
}

/// Per-session mutable state.
#[derive(Debug)]
struct SessionState {
    previous_voice: Option<Voice>,
    rituals: RitualMonitor,
}

pub struct SessionCoordinator {
    store: Arc<GraphStore>,
    selector: VoiceSelector,
    classifier: PhaseClassifier,
    session: Mutex<SessionState>,
}

impl SessionCoordinator {
    /// Fresh store built from `config.graph`.
    pub fn new(config: &SparkConfig) -> Self {
        Self::with_store(Arc::new(GraphStore::new(config.graph.clone())), config)
    }

    /// Share an existing store, e.g. across sessions.
    pub fn with_store(store: Arc<GraphStore>, config: &SparkConfig) -> Self {
        Self {
            store,
            selector: VoiceSelector::new(config.voice.inertia),
            classifier: PhaseClassifier::default(),
            session: Mutex::new(SessionState {
                previous_voice: None,
                rituals: RitualMonitor::new(
                    RitualTriggerDetector::default(),
                    config.rituals.history_len,
                ),
            }),
        }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn previous_voice(&self) -> Option<Voice> {
        self.lock_session().previous_voice
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Voice (with inertia from the last evaluation), phase and triggers.
    pub fn evaluate(&self, metrics: &MetricsVector) -> Evaluation {
        let metrics = metrics.sanitized();
        let mut session = self.lock_session();

        let selection = self
            .selector
            .select_with_inertia(&metrics, session.previous_voice);
        let phase = self.classifier.classify(&metrics);
        let triggers = session.rituals.observe(&metrics);

        if session.previous_voice != Some(selection.voice) {
            tracing::info!("Voice -> {} (phase {})", selection.voice, phase);
        }
        session.previous_voice = Some(selection.voice);

        Evaluation {
            voice: selection.voice,
            phase,
            triggers,
            inertia_applied: selection.inertia_applied,
        }
    }

    /// Evaluate, store the observation in L2, and connect it.
    pub fn observe(
        &self,
        node_type: &str,
        content: &str,
        metrics: &MetricsVector,
    ) -> GraphResult<Observation> {
        let evaluation = self.evaluate(metrics);
        let draft = NodeDraft::new(Layer::L2, node_type, content)
            .with_metrics(metrics.clone())
            .with_meta("voice", serde_json::json!(evaluation.voice.name()))
            .with_meta("phase", serde_json::json!(evaluation.phase.name()));
        let node_id = self.store.add_node(draft)?;
        let edges = self.store.build_connections(&node_id);
        Ok(Observation { evaluation, node_id, edges })
    }

    /// Record that a ritual fired, as an L1 node with a CAUSAL edge from `cause_id`.
    pub fn record_ritual(
        &self,
        trigger: &RitualTrigger,
        cause_id: Option<&str>,
    ) -> GraphResult<String> {
        let content = format!(
            "Ritual {} fired by {} ({}={:.2})",
            trigger.ritual, trigger.rule, trigger.metric, trigger.value
        );
        let draft = NodeDraft::new(Layer::L1, RITUAL_NODE_TYPE, content)
            .with_meta("ritual", serde_json::json!(trigger.ritual.name()))
            .with_meta("rule", serde_json::json!(trigger.rule))
            .with_meta("priority", serde_json::json!(trigger.priority));
        let id = match cause_id {
            Some(cause) => self.store.add_node_linked(draft, cause, EdgeType::Causal, 1.0)?,
            None => self.store.add_node(draft)?,
        };
        tracing::info!("Recorded ritual {} as {}", trigger.ritual, id);
        Ok(id)
    }

    /// Nodes resonating with `metrics` at or above `threshold`.
    pub fn recall(&self, metrics: &MetricsVector, threshold: f32) -> Vec<ScoredNode> {
        self.store
            .find_resonant_nodes(metrics, &ResonanceQuery::with_threshold(threshold))
    }

    /// Forget the inertia anchor and the ritual history.
    pub fn reset_session(&self) {
        let mut session = self.lock_session();
        session.previous_voice = None;
        session.rituals.clear();
    }

    pub async fn checkpoint(&self, persistence: &dyn GraphPersistence) -> Result<()> {
        let snapshot = self.store.export_graph();
        if let Err(e) = persistence.save(&snapshot).await {
            tracing::warn!("Checkpoint failed: {:#}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Replace the graph with the persisted one. Returns `false` when nothing was saved yet.
    pub async fn restore(&self, persistence: &dyn GraphPersistence) -> Result<bool> {
        let loaded = match persistence.load().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Restore failed, keeping current graph: {:#}", e);
                return Err(e);
            }
        };
        match loaded {
            Some(snapshot) => {
                self.store
                    .import_graph(snapshot)
                    .context("Persisted graph is invalid")?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
