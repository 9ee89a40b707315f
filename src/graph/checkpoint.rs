// SPDX-License-Identifier: MIT

//! Checkpoint persistence for workflow sessions.
//!
//! One checkpoint record per session identifier: the full workflow state plus
//! the name of the step it was saved at. Records are overwritten after every
//! step execution and never deleted. Concurrent writers to the same session
//! identifier must be serialized by the caller.

use crate::error::EngineError;
use crate::graph::state::WorkflowState;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// Persisted snapshot of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub state: WorkflowState,
    pub step: String,
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(
        &self,
        session_id: &str,
        state: &WorkflowState,
        current_step: &str,
    ) -> Result<(), EngineError>;

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, EngineError>;
}

/// In-memory checkpoint store for tests and short-lived demo runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    inner: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(
        &self,
        session_id: &str,
        state: &WorkflowState,
        current_step: &str,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.write().await;
        inner.insert(
            session_id.to_string(),
            Checkpoint {
                state: state.clone(),
                step: current_step.to_string(),
            },
        );
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, EngineError> {
        let inner = self.inner.read().await;
        Ok(inner.get(session_id).cloned())
    }
}

/// SQLite-backed checkpoint store. The schema is created on first open.
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, EngineError> {
        let conn = Connection::open(db_path.as_ref())?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                session_id TEXT PRIMARY KEY,
                step       TEXT NOT NULL,
                state      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        log::info!("Checkpoint database ready at {:?}", db_path.as_ref());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(
        &self,
        session_id: &str,
        state: &WorkflowState,
        current_step: &str,
    ) -> Result<(), EngineError> {
        let encoded = serde_json::to_string(state)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO checkpoints (session_id, step, state, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                 step = excluded.step,
                 state = excluded.state,
                 updated_at = excluded.updated_at",
            params![
                session_id,
                current_step,
                encoded,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, EngineError> {
        let row: Option<(String, String)> = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT step, state FROM checkpoints WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        };

        match row {
            None => Ok(None),
            Some((step, encoded)) => {
                let state: WorkflowState = serde_json::from_str(&encoded)?;
                Ok(Some(Checkpoint { state, step }))
            }
        }
    }
}
