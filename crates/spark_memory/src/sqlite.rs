use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::path::Path;

use crate::graph::GraphSnapshot;
use crate::persistence::GraphPersistence;

/// Graph snapshot kept as one JSON row in SQLite.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: Pool<Sqlite>,
}

impl SqlitePersistence {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database, for tests and throwaway sessions.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<std::time::Duration>)
            .max_lifetime(None::<std::time::Duration>)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        // Graph snapshot (singleton - only one row)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS graph_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                snapshot_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create graph_snapshot table")?;
        Ok(())
    }

    /// Unix timestamp of the last save, if any.
    pub async fn updated_at(&self) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT updated_at FROM graph_snapshot WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query graph_snapshot")?;
        Ok(row.map(|r| r.get("updated_at")))
    }
}

#[async_trait]
impl GraphPersistence for SqlitePersistence {
    async fn load(&self) -> Result<Option<GraphSnapshot>> {
        let row = sqlx::query("SELECT snapshot_json FROM graph_snapshot WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query graph_snapshot")?;

        if let Some(row) = row {
            let json: String = row.get("snapshot_json");
            let snapshot: GraphSnapshot =
                serde_json::from_str(&json).context("Failed to deserialize graph snapshot")?;
            Ok(Some(snapshot))
        } else {
            Ok(None)
        }
    }

    async fn save(&self, snapshot: &GraphSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot).context("Failed to serialize graph snapshot")?;
        let now = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO graph_snapshot (id, snapshot_json, updated_at) VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET snapshot_json = excluded.snapshot_json, updated_at = excluded.updated_at",
        )
        .bind(&json)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to save graph snapshot")?;

        tracing::debug!("Graph snapshot saved ({} nodes)", snapshot.nodes.len());
        Ok(())
    }
}
