//! Persistence adapters.
//!
//! The graph itself is in-memory; adapters move a [`GraphSnapshot`] in and
//! out at process boundaries. They are best-effort: callers log failures and
//! carry on with what they have.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::graph::GraphSnapshot;

#[async_trait]
pub trait GraphPersistence: Send + Sync {
    /// The last saved snapshot, or `None` if nothing was ever saved.
    async fn load(&self) -> Result<Option<GraphSnapshot>>;
    async fn save(&self, snapshot: &GraphSnapshot) -> Result<()>;
}

/// Single JSON document on disk.
///
/// Saves go to a sibling temp file first and are renamed into place, so a
/// crash mid-write never leaves a truncated document behind.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "graph".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl GraphPersistence for JsonFilePersistence {
    async fn load(&self) -> Result<Option<GraphSnapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No graph file at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        let snapshot: GraphSnapshot = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse graph file {}", self.path.display()))?;
        tracing::info!(
            "Loaded graph from {} ({} nodes, {} edges)",
            self.path.display(),
            snapshot.nodes.len(),
            snapshot.edges.len()
        );
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &GraphSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(snapshot).context("Failed to serialize graph")?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to move graph into {}", self.path.display()))?;
        tracing::info!("Saved graph to {}", self.path.display());
        Ok(())
    }
}
