//! Session/experiment configuration.
//!
//! Supplied at session creation (via the storage collaborator's
//! `load_config`) and immutable for the session's lifetime.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::payoff::{PayoffBounds, PayoffParams, PayoffStrategy};
use crate::domain::state::{GameAction, Phase};
use crate::error::AppError;

/// A seat pre-claimed by an automated or scripted participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomatedSeatSpec {
    /// Provider name as registered in `providers::registry`.
    pub provider: String,
    pub seed: Option<u64>,
    /// Fixed per-round action sequence for the `scripted` provider.
    #[serde(default)]
    pub script: Vec<GameAction>,
    /// Optional per-round outgoing broadcast messages for the `scripted`
    /// provider.
    #[serde(default)]
    pub chat_script: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub seats: u8,
    pub total_rounds: u32,
    pub announcement_ms: u64,
    pub communication_ms: u64,
    pub action_ms: u64,
    pub revelation_ms: u64,
    /// Opt-outs available to each participant across the whole session.
    pub refusal_budget: u32,
    pub payoff: PayoffParams,
    /// Phase entry is held until at least this many humans are connected.
    pub min_connected_humans: usize,
    pub chat_history_cap: usize,
    /// Seats claimed by automated participants before any human joins.
    #[serde(default)]
    pub automated_seats: Vec<AutomatedSeatSpec>,
    /// Session RNG seed; derived from the session id when absent.
    pub rng_seed: Option<u64>,
}

impl SessionConfig {
    pub fn phase_duration(&self, phase: Phase) -> Duration {
        let ms = match phase {
            Phase::Announcement => self.announcement_ms,
            Phase::Communication => self.communication_ms,
            Phase::Action => self.action_ms,
            Phase::Revelation => self.revelation_ms,
            Phase::Waiting | Phase::Ended => 0,
        };
        Duration::from_millis(ms)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(2..=16).contains(&self.seats) {
            return Err(AppError::config(format!(
                "seats must be in 2..=16, got {}",
                self.seats
            )));
        }
        if self.total_rounds == 0 {
            return Err(AppError::config("total_rounds must be >= 1".into()));
        }
        for (name, ms) in [
            ("announcement_ms", self.announcement_ms),
            ("communication_ms", self.communication_ms),
            ("action_ms", self.action_ms),
            ("revelation_ms", self.revelation_ms),
        ] {
            if ms == 0 {
                return Err(AppError::config(format!("{name} must be > 0")));
            }
        }
        let bounds = self.payoff.bounds;
        if bounds.min < 0.0 || bounds.min > bounds.max {
            return Err(AppError::config(format!(
                "payoff bounds must satisfy 0 <= min <= max, got [{}, {}]",
                bounds.min, bounds.max
            )));
        }
        if self.automated_seats.len() >= usize::from(self.seats) {
            return Err(AppError::config(
                "automated seats must leave at least one human seat".into(),
            ));
        }
        Ok(())
    }

    /// Demo experiment shipped with the in-memory store.
    pub fn demo() -> Self {
        Self {
            seats: 3,
            total_rounds: 5,
            announcement_ms: 15_000,
            communication_ms: 90_000,
            action_ms: 45_000,
            revelation_ms: 15_000,
            refusal_budget: 2,
            payoff: PayoffParams {
                strategy: PayoffStrategy::Escalating { factor: 0.25 },
                bounds: PayoffBounds {
                    min: 0.0,
                    max: 100.0,
                },
                opt_out_payoff: 1.0,
            },
            min_connected_humans: 1,
            chat_history_cap: 500,
            automated_seats: vec![AutomatedSeatSpec {
                provider: "tit_for_tat".into(),
                seed: None,
                script: Vec::new(),
                chat_script: Vec::new(),
            }],
            rng_seed: None,
        }
    }

    /// Small, fast configuration used by unit tests and the demo room.
    pub fn for_tests(seats: u8, total_rounds: u32) -> Self {
        Self {
            seats,
            total_rounds,
            announcement_ms: 40,
            communication_ms: 40,
            action_ms: 60,
            revelation_ms: 40,
            refusal_budget: 1,
            payoff: PayoffParams {
                strategy: PayoffStrategy::Static,
                bounds: PayoffBounds {
                    min: 0.0,
                    max: 100.0,
                },
                opt_out_payoff: 0.5,
            },
            min_connected_humans: 0,
            chat_history_cap: 256,
            automated_seats: Vec::new(),
            rng_seed: Some(42),
        }
    }
}
