use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::payoff::PayoffSchedule;
use crate::domain::snapshot::{EndReason, SessionSnapshot, StateDelta};
use crate::domain::state::{GameAction, Phase, Seat};
use crate::error::AppError;

pub const PROTOCOL_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedRole {
    Player,
    Controller,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// First message on every connection. A reconnection credential on the
    /// handshake resumes an existing seat; otherwise `identity` is the
    /// caller's identity claim for waiting-room admission.
    Hello {
        protocol: i32,
        identity: Option<String>,
        credential: Option<String>,
    },
    OpenRoom {
        experiment_id: String,
    },
    JoinRoom {
        room_id: Uuid,
        role: RequestedRole,
    },
    StartSession,
    /// Controller only: force the current phase forward (or release a
    /// held phase).
    OverridePhase,
    /// Controller only: end the session early.
    TerminateSession,
    SubmitAction {
        action: GameAction,
    },
    SendChat {
        /// Target seat; absent means broadcast-to-all-plus-controller.
        to: Option<Seat>,
        content: String,
    },
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    HelloAck {
        protocol: i32,
        identity: Option<String>,
    },

    RoomOpened {
        room_id: Uuid,
    },

    JoinedRoom {
        room_id: Uuid,
        seat: Option<Seat>,
        role: RequestedRole,
        credential: String,
    },

    RoomUpdate {
        room_id: Uuid,
        claimed_seats: usize,
        required_seats: usize,
        ready: bool,
        controller_present: bool,
    },

    RoomClosed {
        room_id: Uuid,
        reason: String,
    },

    SessionStarted {
        session_id: Uuid,
    },

    StateSnapshot {
        version: u64,
        snapshot: SessionSnapshot,
    },

    StateDelta {
        version: u64,
        delta: StateDelta,
    },

    PhaseChanged {
        version: u64,
        phase: Phase,
        round: u32,
        deadline_ms: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        schedule: Option<PayoffSchedule>,
    },

    Chat {
        sender: Seat,
        to: Option<Seat>,
        content: String,
        round: u32,
    },

    SessionEnded {
        version: u64,
        reason: EndReason,
        final_scores: Vec<(Seat, f64)>,
        mean_cooperation_rate: f64,
    },

    Error {
        code: ErrorCode,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadProtocol,
    BadRequest,
    PhaseViolation,
    Forbidden,
    Capacity,
    NotFound,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadProtocol => "bad_protocol",
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::PhaseViolation => "phase_violation",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::Capacity => "capacity",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Internal => "internal",
        }
    }
}

impl From<&AppError> for ErrorCode {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::Validation { code, .. } if *code == "PHASE_VIOLATION" => {
                ErrorCode::PhaseViolation
            }
            AppError::Validation { .. } | AppError::BadRequest { .. } => ErrorCode::BadRequest,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::Capacity { .. } => ErrorCode::Capacity,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::Invariant { .. } | AppError::Internal { .. } | AppError::Config { .. } => {
                ErrorCode::Internal
            }
        }
    }
}

/// Wrap a state delta in its outbound message. Phase changes and session
/// end carry dedicated event types; everything else travels as
/// `state_delta`.
pub fn delta_msg(version: u64, delta: StateDelta) -> ServerMsg {
    match delta {
        StateDelta::PhaseChanged {
            phase,
            round,
            deadline_ms,
            schedule,
        } => ServerMsg::PhaseChanged {
            version,
            phase,
            round,
            deadline_ms,
            schedule,
        },
        StateDelta::SessionEnded {
            reason,
            final_scores,
            mean_cooperation_rate,
        } => ServerMsg::SessionEnded {
            version,
            reason,
            final_scores,
            mean_cooperation_rate,
        },
        other => ServerMsg::StateDelta {
            version,
            delta: other,
        },
    }
}

/// Typed error reply for the originating connection only.
pub fn error_msg(err: &AppError) -> ServerMsg {
    ServerMsg::Error {
        code: ErrorCode::from(err),
        message: err.detail(),
    }
}
