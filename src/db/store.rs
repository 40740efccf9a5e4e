//! Last-write-wins persistence of the whole recorder record.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::models::{Event, ReportHistory};
use crate::settings::Settings;

use super::Database;

/// Everything that survives a restart. Overwritten wholesale on every
/// mutating operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedRecord {
    pub recording: bool,
    pub paused: bool,
    pub live_events: Vec<Event>,
    pub settings: Settings,
    pub reports: ReportHistory,
    pub session_id: Option<String>,
}

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn load(&self) -> Result<Option<PersistedRecord>>;
    async fn save(&self, record: &PersistedRecord) -> Result<()>;
}

#[async_trait]
impl PersistenceStore for Database {
    async fn load(&self) -> Result<Option<PersistedRecord>> {
        let payload: Option<String> = self
            .execute(|conn| {
                conn.query_row(
                    "SELECT payload FROM recorder_state WHERE id = 1",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .context("failed to read recorder state")
            })
            .await?;

        payload
            .map(|raw| serde_json::from_str(&raw).context("failed to decode recorder state"))
            .transpose()
    }

    async fn save(&self, record: &PersistedRecord) -> Result<()> {
        let payload = serde_json::to_string(record).context("failed to encode recorder state")?;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO recorder_state (id, payload, updated_at)
                 VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                     payload = excluded.payload,
                     updated_at = excluded.updated_at",
                params![payload, Utc::now().to_rfc3339()],
            )
            .context("failed to write recorder state")?;
            Ok(())
        })
        .await
    }
}

/// Process-local store for ephemeral runs. Nothing outlives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<PersistedRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PersistedRecord>> {
        match self.record.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn load(&self) -> Result<Option<PersistedRecord>> {
        Ok(self.lock().clone())
    }

    async fn save(&self, record: &PersistedRecord) -> Result<()> {
        *self.lock() = Some(record.clone());
        Ok(())
    }
}
