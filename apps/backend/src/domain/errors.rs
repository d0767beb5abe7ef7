//! Domain-level error type used across services and actors.
//!
//! This error type is transport- and storage-agnostic. Actor handlers return
//! `Result<T, crate::error::AppError>` and convert from `DomainError` using
//! the provided `From<DomainError> for AppError` implementation.

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Validation failure kinds (malformed or out-of-phase input).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationKind {
    /// Command is not accepted in the current phase.
    PhaseMismatch,
    /// Action is not in the enumerated action set.
    UnknownAction,
    /// Opt-out requested with no refusal budget remaining.
    BudgetExhausted,
    /// Participant already submitted an action this round.
    AlreadySubmitted,
    /// Chat recipient seat does not exist.
    BadRecipient,
    /// Sender holds no seat in this session.
    NotSeated,
    Other(String),
}

/// Capacity/seat conflict kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConflictKind {
    RoomFull,
    SeatTaken,
    ControllerTaken,
    AlreadyStarted,
    NotReady,
    Other(String),
}

/// Missing resource in domain terms.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NotFoundKind {
    Session,
    Room,
    Participant,
    Other(String),
}

/// Central domain error type.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Input/user validation or business rule violation.
    Validation(ValidationKind, String),
    /// Seat or capacity conflict.
    Conflict(ConflictKind, String),
    /// Caller lacks controller (or seat) authority for the operation.
    Authorization(String),
    /// Missing resource in domain terms.
    NotFound(NotFoundKind, String),
    /// Broken internal invariant; fatal to the owning session.
    Invariant(String),
}

impl Display for DomainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DomainError::Validation(kind, d) => write!(f, "validation {kind:?}: {d}"),
            DomainError::Conflict(kind, d) => write!(f, "conflict {kind:?}: {d}"),
            DomainError::Authorization(d) => write!(f, "authorization: {d}"),
            DomainError::NotFound(kind, d) => write!(f, "not found {kind:?}: {d}"),
            DomainError::Invariant(d) => write!(f, "invariant violated: {d}"),
        }
    }
}

impl Error for DomainError {}

impl DomainError {
    pub fn validation(kind: ValidationKind, detail: impl Into<String>) -> Self {
        Self::Validation(kind, detail.into())
    }
    pub fn conflict(kind: ConflictKind, detail: impl Into<String>) -> Self {
        Self::Conflict(kind, detail.into())
    }
    pub fn authorization(detail: impl Into<String>) -> Self {
        Self::Authorization(detail.into())
    }
    pub fn not_found(kind: NotFoundKind, detail: impl Into<String>) -> Self {
        Self::NotFound(kind, detail.into())
    }
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::Invariant(detail.into())
    }
}
