//! Action-provider trait definition.
//!
//! Automated and scripted participants are driven by an [`ActionProvider`].
//! Providers are opaque to the orchestrator: a provider that errors or
//! does not respond before the phase deadline is treated identically to a
//! non-responsive human (the deadline default is applied).

use std::fmt;

use async_trait::async_trait;

use crate::domain::chat::ChatRecipient;
use crate::domain::payoff::PayoffSchedule;
use crate::domain::rounds::RoundOutcome;
use crate::domain::state::{GameAction, Seat};

/// Errors that can occur during provider decision-making.
#[derive(Debug)]
pub enum ProviderError {
    /// Provider failed to decide within the phase deadline.
    Timeout,
    /// Provider encountered an internal error.
    Internal(String),
    /// Provider produced an action outside the legal set.
    InvalidAction(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Timeout => write!(f, "provider decision timeout"),
            ProviderError::Internal(msg) => write!(f, "provider internal error: {msg}"),
            ProviderError::InvalidAction(msg) => write!(f, "provider invalid action: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Everything a provider may observe when deciding: its own seat and
/// budget, the published schedule, and revealed history. Pending actions
/// of other participants are never exposed.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub seat: Seat,
    pub seats: usize,
    pub round: u32,
    pub schedule: PayoffSchedule,
    pub refusal_budget: u32,
    pub history: Vec<RoundOutcome>,
}

impl ProviderContext {
    /// Actions this seat may legally submit right now.
    pub fn legal_actions(&self) -> Vec<GameAction> {
        let mut actions = vec![GameAction::Cooperate, GameAction::Defect];
        if self.refusal_budget > 0 {
            actions.push(GameAction::OptOut);
        }
        actions
    }
}

/// An outgoing chat produced by a provider during `Communication`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingChat {
    pub to: ChatRecipient,
    pub content: String,
}

/// Trait for automated participants.
#[async_trait]
pub trait ActionProvider: Send + Sync {
    /// Choose an action for the `Action` phase.
    ///
    /// Implementations should pick from `ctx.legal_actions()`.
    async fn request_action(&self, ctx: &ProviderContext) -> Result<GameAction, ProviderError>;

    /// Produce outgoing chats for the `Communication` phase. Most
    /// providers stay silent.
    async fn request_messages(
        &self,
        _ctx: &ProviderContext,
    ) -> Result<Vec<OutgoingChat>, ProviderError> {
        Ok(Vec::new())
    }
}
