//! Phase-gated, directed chat routing and the capped session chat history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::errors::{DomainError, ValidationKind};
use crate::domain::state::{Phase, Seat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRecipient {
    /// Broadcast to every seat plus the controller.
    All,
    /// Delivered to one seat and mirrored to the controller.
    Seat(Seat),
}

/// Append-only chat entry; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub sender: Seat,
    pub recipient: ChatRecipient,
    pub content: String,
    pub round: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

/// Where a routed message must be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub seats: Vec<Seat>,
    pub to_controller: bool,
}

/// Accept a message only during `Communication` and compute its delivery
/// set. Directed messages reach the target seat and the controller;
/// undirected messages reach every seat plus the controller.
pub fn route(
    phase: Phase,
    sender: Seat,
    recipient: ChatRecipient,
    seats: usize,
) -> Result<Delivery, DomainError> {
    if phase != Phase::Communication {
        return Err(DomainError::validation(
            ValidationKind::PhaseMismatch,
            format!("chat is not accepted during {phase:?}"),
        ));
    }
    match recipient {
        ChatRecipient::Seat(target) => {
            if usize::from(target) >= seats {
                return Err(DomainError::validation(
                    ValidationKind::BadRecipient,
                    format!("seat {target} does not exist"),
                ));
            }
            Ok(Delivery {
                seats: vec![target],
                to_controller: true,
            })
        }
        ChatRecipient::All => Ok(Delivery {
            seats: (0..seats as Seat).filter(|s| *s != sender).collect(),
            to_controller: true,
        }),
    }
}

struct ChatEntry {
    record: ChatRecord,
    archived: bool,
}

/// Bounded chat history. Oldest-first eviction keeps memory capped, but an
/// entry is only evicted once the external archive holds it; unarchived
/// entries are retained past the cap.
pub struct ChatLog {
    entries: VecDeque<ChatEntry>,
    cap: usize,
}

impl std::fmt::Debug for ChatLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatLog")
            .field("len", &self.entries.len())
            .field("cap", &self.cap)
            .finish()
    }
}

impl Clone for ChatLog {
    fn clone(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|e| ChatEntry {
                    record: e.record.clone(),
                    archived: e.archived,
                })
                .collect(),
            cap: self.cap,
        }
    }
}

impl ChatLog {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, record: ChatRecord) {
        self.entries.push_back(ChatEntry {
            record,
            archived: false,
        });
        while self.entries.len() > self.cap {
            match self.entries.front() {
                Some(front) if front.archived => {
                    self.entries.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Mark a record as persisted to the external store, unlocking it for
    /// eviction. Matched by identity (sender, round, timestamp).
    pub fn mark_archived(&mut self, record: &ChatRecord) {
        if let Some(entry) = self.entries.iter_mut().find(|e| {
            !e.archived
                && e.record.sender == record.sender
                && e.record.round == record.round
                && e.record.at == record.at
        }) {
            entry.archived = true;
        }
        while self.entries.len() > self.cap {
            match self.entries.front() {
                Some(front) if front.archived => {
                    self.entries.pop_front();
                }
                _ => break,
            }
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &ChatRecord> {
        self.entries.iter().map(|e| &e.record)
    }
}
