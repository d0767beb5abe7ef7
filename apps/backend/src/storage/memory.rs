//! In-memory `ArchiveStore` implementation.
//!
//! Backs development and tests; sessions and tests receive the store as an
//! explicitly passed handle so a real adapter can be substituted without
//! touching the core.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::domain::chat::ChatRecord;
use crate::domain::rounds::RoundRecord;
use crate::storage::{ArchiveError, ArchiveStore, SessionStatus};

#[derive(Default)]
pub struct MemoryStore {
    configs: RwLock<HashMap<String, SessionConfig>>,
    rounds: RwLock<HashMap<Uuid, Vec<RoundRecord>>>,
    chats: RwLock<HashMap<Uuid, Vec<ChatRecord>>>,
    statuses: RwLock<HashMap<Uuid, SessionStatus>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_config(&self, experiment_id: impl Into<String>, config: SessionConfig) {
        self.configs.write().insert(experiment_id.into(), config);
    }

    pub fn round_records(&self, session_id: Uuid) -> Vec<RoundRecord> {
        self.rounds
            .read()
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn chat_records(&self, session_id: Uuid) -> Vec<ChatRecord> {
        self.chats
            .read()
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn status(&self, session_id: Uuid) -> Option<SessionStatus> {
        self.statuses.read().get(&session_id).copied()
    }
}

#[async_trait]
impl ArchiveStore for MemoryStore {
    async fn load_config(&self, experiment_id: &str) -> Result<SessionConfig, ArchiveError> {
        self.configs
            .read()
            .get(experiment_id)
            .cloned()
            .ok_or_else(|| ArchiveError::NotFound(format!("experiment {experiment_id}")))
    }

    async fn save_round_record(
        &self,
        session_id: Uuid,
        record: &RoundRecord,
    ) -> Result<(), ArchiveError> {
        self.rounds
            .write()
            .entry(session_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn save_chat_record(
        &self,
        session_id: Uuid,
        record: &ChatRecord,
    ) -> Result<(), ArchiveError> {
        self.chats
            .write()
            .entry(session_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
    ) -> Result<(), ArchiveError> {
        self.statuses.write().insert(session_id, status);
        Ok(())
    }
}
