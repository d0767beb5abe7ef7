use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::chat::ChatLog;
use crate::domain::errors::{DomainError, ValidationKind};
use crate::domain::payoff::PayoffSchedule;
use crate::domain::rounds::RoundRecord;

pub type Seat = u8;

/// External identity claim for a participant or controller.
pub type ParticipantId = String;

/// Session progression phases.
///
/// `Waiting` precedes the first round; the four round phases repeat for
/// `total_rounds`, then `Ended`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Session created, first round not yet started.
    Waiting,
    /// Round's payoff schedule published; no participant input accepted.
    Announcement,
    /// Chat accepted; no action submission accepted.
    Communication,
    /// Exactly one action per participant accepted.
    Action,
    /// Payoffs computed and revealed.
    Revelation,
    /// All rounds complete or session terminated.
    Ended,
}

/// The enumerated action set for the `Action` phase.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameAction {
    Cooperate,
    Defect,
    OptOut,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    Human,
    Automated,
    Scripted,
}

/// One seated participant. Owned exclusively by the Session that contains
/// it; mutated only by the session actor.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub seat: Seat,
    pub kind: ParticipantKind,
    pub connected: bool,
    pub cumulative_score: f64,
    pub refusal_budget: u32,
    pub pending_action: Option<GameAction>,
    pub submitted: bool,
}

impl Participant {
    pub fn new(id: ParticipantId, seat: Seat, kind: ParticipantKind, refusal_budget: u32) -> Self {
        Self {
            id,
            seat,
            kind,
            connected: false,
            cumulative_score: 0.0,
            refusal_budget,
            pending_action: None,
            submitted: false,
        }
    }

    pub fn is_human(&self) -> bool {
        self.kind == ParticipantKind::Human
    }
}

/// Authoritative state for one session. The seat set is fixed at creation
/// and never resized.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: Uuid,
    pub phase: Phase,
    /// 1-based once the first `Announcement` is entered; 0 while `Waiting`.
    pub current_round: u32,
    pub total_rounds: u32,
    pub participants: Vec<Participant>,
    pub controller: ParticipantId,
    /// Schedule for the round currently in flight.
    pub schedule: Option<PayoffSchedule>,
    pub round_records: Vec<RoundRecord>,
    pub chat: ChatLog,
    /// Monotonic counter bumped on every broadcast-visible mutation.
    pub version: u64,
}

impl SessionState {
    pub fn new(
        session_id: Uuid,
        total_rounds: u32,
        participants: Vec<Participant>,
        controller: ParticipantId,
        chat_cap: usize,
    ) -> Self {
        Self {
            session_id,
            phase: Phase::Waiting,
            current_round: 0,
            total_rounds,
            participants,
            controller,
            schedule: None,
            round_records: Vec::new(),
            chat: ChatLog::new(chat_cap),
            version: 0,
        }
    }

    pub fn seats(&self) -> usize {
        self.participants.len()
    }

    pub fn participant(&self, seat: Seat) -> Option<&Participant> {
        self.participants.get(seat as usize)
    }

    pub fn participant_mut(&mut self, seat: Seat) -> Option<&mut Participant> {
        self.participants.get_mut(seat as usize)
    }

    pub fn seat_of(&self, id: &str) -> Option<Seat> {
        self.participants
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.seat)
    }

    pub fn is_controller(&self, id: &str) -> bool {
        self.controller == id
    }

    pub fn connected_humans(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.is_human() && p.connected)
            .count()
    }

    /// Early-completion condition for the `Action` phase.
    pub fn all_actions_submitted(&self) -> bool {
        self.participants.iter().all(|p| p.submitted)
    }

    pub fn cooperation_rates(&self) -> Vec<f64> {
        self.round_records
            .iter()
            .map(|r| r.outcome.cooperation_rate)
            .collect()
    }

    pub fn final_scores(&self) -> Vec<(Seat, f64)> {
        self.participants
            .iter()
            .map(|p| (p.seat, p.cumulative_score))
            .collect()
    }

    pub fn require_phase(&self, expected: Phase, what: &str) -> Result<(), DomainError> {
        if self.phase != expected {
            return Err(DomainError::validation(
                ValidationKind::PhaseMismatch,
                format!("{what} is not accepted during {:?}", self.phase),
            ));
        }
        Ok(())
    }

    pub fn require_seat(&self, id: &str) -> Result<Seat, DomainError> {
        self.seat_of(id).ok_or_else(|| {
            DomainError::validation(
                ValidationKind::NotSeated,
                format!("identity {id} holds no seat in this session"),
            )
        })
    }

    /// `round_records.len() == current_round - 1` at all times outside the
    /// revelation transition itself.
    pub fn check_record_invariant(&self) -> Result<(), DomainError> {
        let expected = self.current_round.saturating_sub(1) as usize;
        if self.round_records.len() != expected {
            return Err(DomainError::invariant(format!(
                "round record count {} != current_round - 1 ({expected})",
                self.round_records.len()
            )));
        }
        Ok(())
    }
}
