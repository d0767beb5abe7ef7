//! Persistence collaborator.
//!
//! Experiment definitions, round archives, and chat archives live behind
//! the [`ArchiveStore`] trait. Archival is best-effort: the authoritative
//! state lives in the session, and a store failure is logged, never
//! allowed to block phase progression. No operation is retried by the
//! core; retries belong to the store implementation.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::domain::chat::ChatRecord;
use crate::domain::rounds::RoundRecord;

pub mod memory;

pub use memory::MemoryStore;

/// Experiment/session status written through the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Lobby,
    Running,
    Completed,
    Failed,
}

#[derive(Debug)]
pub enum ArchiveError {
    NotFound(String),
    Unavailable(String),
    Serialization(String),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::NotFound(d) => write!(f, "not found: {d}"),
            ArchiveError::Unavailable(d) => write!(f, "store unavailable: {d}"),
            ArchiveError::Serialization(d) => write!(f, "serialization failed: {d}"),
        }
    }
}

impl std::error::Error for ArchiveError {}

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn load_config(&self, experiment_id: &str) -> Result<SessionConfig, ArchiveError>;

    async fn save_round_record(
        &self,
        session_id: Uuid,
        record: &RoundRecord,
    ) -> Result<(), ArchiveError>;

    async fn save_chat_record(
        &self,
        session_id: Uuid,
        record: &ChatRecord,
    ) -> Result<(), ArchiveError>;

    async fn update_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
    ) -> Result<(), ArchiveError>;
}
