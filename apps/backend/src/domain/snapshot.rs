//! Public snapshot and delta types for observing session state.
//!
//! A subscriber receives one full snapshot on subscribe, then minimal
//! deltas. Each mutating operation in the session actor emits its own
//! delta record; there is no field-diffing machinery.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::payoff::PayoffSchedule;
use crate::domain::rounds::RoundOutcome;
use crate::domain::state::{ParticipantKind, Phase, Seat, SessionState};

/// Public info about a single seat. Pending actions stay private until
/// revelation; only the submission flag is visible.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeatPublic {
    pub seat: Seat,
    pub kind: ParticipantKind,
    pub connected: bool,
    pub cumulative_score: f64,
    pub refusal_budget: u32,
    pub submitted: bool,
}

/// Session-level header present in all snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionHeader {
    pub session_id: Uuid,
    pub round: u32,
    pub total_rounds: u32,
    pub seating: Vec<SeatPublic>,
}

/// Full snapshot sent on initial subscribe (and as the terminal flush).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub header: SessionHeader,
    pub phase: Phase,
    /// Unix milliseconds; `None` while the phase is held or untimed.
    pub deadline_ms: Option<i64>,
    pub schedule: Option<PayoffSchedule>,
    pub last_outcome: Option<RoundOutcome>,
}

/// Minimal delta published after each mutation. Delivery order to a given
/// subscriber matches mutation order; distinct deltas are never coalesced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateDelta {
    PhaseChanged {
        phase: Phase,
        round: u32,
        deadline_ms: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        schedule: Option<PayoffSchedule>,
    },
    /// Entry precondition failed; the phase timer is paused, not cancelled.
    PhaseHeld {
        phase: Phase,
        connected_humans: usize,
        required: usize,
    },
    ActionSubmitted {
        seat: Seat,
    },
    ConnectionChanged {
        seat: Seat,
        connected: bool,
    },
    RoundRevealed {
        outcome: RoundOutcome,
    },
    SessionEnded {
        reason: EndReason,
        final_scores: Vec<(Seat, f64)>,
        mean_cooperation_rate: f64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    Terminated,
    Error,
}

/// Produce a full snapshot of the current session state.
pub fn snapshot(state: &SessionState, deadline_ms: Option<i64>) -> SessionSnapshot {
    let seating = state
        .participants
        .iter()
        .map(|p| SeatPublic {
            seat: p.seat,
            kind: p.kind,
            connected: p.connected,
            cumulative_score: p.cumulative_score,
            refusal_budget: p.refusal_budget,
            submitted: p.submitted,
        })
        .collect();

    SessionSnapshot {
        header: SessionHeader {
            session_id: state.session_id,
            round: state.current_round,
            total_rounds: state.total_rounds,
            seating,
        },
        phase: state.phase,
        deadline_ms,
        schedule: state.schedule.clone(),
        last_outcome: state.round_records.last().map(|r| r.outcome.clone()),
    }
}
