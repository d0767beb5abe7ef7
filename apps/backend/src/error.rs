use actix_web::error::ResponseError;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;
use thiserror::Error;

use crate::domain::errors::{ConflictKind, DomainError, NotFoundKind, ValidationKind};

#[derive(Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {detail}")]
    Validation { code: &'static str, detail: String },
    #[error("Bad request: {detail}")]
    BadRequest { code: &'static str, detail: String },
    #[error("Forbidden: {detail}")]
    Forbidden { detail: String },
    #[error("Not found: {detail}")]
    NotFound { code: &'static str, detail: String },
    #[error("Capacity: {detail}")]
    Capacity { code: &'static str, detail: String },
    #[error("Invariant violation: {detail}")]
    Invariant { detail: String },
    #[error("Internal error: {detail}")]
    Internal { detail: String },
    #[error("Configuration error: {detail}")]
    Config { detail: String },
}

impl AppError {
    /// Helper method to extract error code from any error variant
    pub fn code(&self) -> String {
        match self {
            AppError::Validation { code, .. } => code.to_string(),
            AppError::BadRequest { code, .. } => code.to_string(),
            AppError::Forbidden { .. } => "FORBIDDEN".to_string(),
            AppError::NotFound { code, .. } => code.to_string(),
            AppError::Capacity { code, .. } => code.to_string(),
            AppError::Invariant { .. } => "INVARIANT_VIOLATION".to_string(),
            AppError::Internal { .. } => "INTERNAL".to_string(),
            AppError::Config { .. } => "CONFIG_ERROR".to_string(),
        }
    }

    /// Helper method to extract error detail from any error variant
    pub fn detail(&self) -> String {
        match self {
            AppError::Validation { detail, .. } => detail.clone(),
            AppError::BadRequest { detail, .. } => detail.clone(),
            AppError::Forbidden { detail } => detail.clone(),
            AppError::NotFound { detail, .. } => detail.clone(),
            AppError::Capacity { detail, .. } => detail.clone(),
            AppError::Invariant { detail } => detail.clone(),
            AppError::Internal { detail } => detail.clone(),
            AppError::Config { detail } => detail.clone(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Capacity { .. } => StatusCode::CONFLICT,
            AppError::Invariant { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for errors that are fatal to the owning session (§7: forced
    /// safe disposal rather than an inconsistent live session).
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Invariant { .. })
    }

    pub fn invalid(code: &'static str, detail: String) -> Self {
        Self::Validation { code, detail }
    }

    pub fn bad_request(code: &'static str, detail: String) -> Self {
        Self::BadRequest { code, detail }
    }

    pub fn forbidden(detail: String) -> Self {
        Self::Forbidden { detail }
    }

    pub fn not_found(code: &'static str, detail: String) -> Self {
        Self::NotFound { code, detail }
    }

    pub fn capacity(code: &'static str, detail: String) -> Self {
        Self::Capacity { code, detail }
    }

    pub fn invariant(detail: String) -> Self {
        Self::Invariant { detail }
    }

    pub fn internal(detail: String) -> Self {
        Self::Internal { detail }
    }

    pub fn config(detail: String) -> Self {
        Self::Config { detail }
    }

    fn humanize_code(code: &str) -> String {
        code.split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    None => String::new(),
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(kind, detail) => {
                let code = match kind {
                    ValidationKind::PhaseMismatch => "PHASE_VIOLATION",
                    ValidationKind::UnknownAction => "UNKNOWN_ACTION",
                    ValidationKind::BudgetExhausted => "REFUSAL_BUDGET_EXHAUSTED",
                    ValidationKind::AlreadySubmitted => "ALREADY_SUBMITTED",
                    ValidationKind::BadRecipient => "BAD_RECIPIENT",
                    ValidationKind::NotSeated => "NOT_SEATED",
                    ValidationKind::Other(_) => "VALIDATION",
                };
                AppError::Validation { code, detail }
            }
            DomainError::Conflict(kind, detail) => {
                let code = match kind {
                    ConflictKind::RoomFull => "ROOM_FULL",
                    ConflictKind::SeatTaken => "SEAT_TAKEN",
                    ConflictKind::ControllerTaken => "CONTROLLER_TAKEN",
                    ConflictKind::AlreadyStarted => "ALREADY_STARTED",
                    ConflictKind::NotReady => "NOT_READY",
                    ConflictKind::Other(_) => "CONFLICT",
                };
                AppError::Capacity { code, detail }
            }
            DomainError::Authorization(detail) => AppError::Forbidden { detail },
            DomainError::NotFound(kind, detail) => {
                let code = match kind {
                    NotFoundKind::Session => "SESSION_NOT_FOUND",
                    NotFoundKind::Room => "ROOM_NOT_FOUND",
                    NotFoundKind::Participant => "PARTICIPANT_NOT_FOUND",
                    NotFoundKind::Other(_) => "NOT_FOUND",
                };
                AppError::NotFound { code, detail }
            }
            DomainError::Invariant(detail) => AppError::Invariant { detail },
        }
    }
}

impl From<std::env::VarError> for AppError {
    fn from(e: std::env::VarError) -> Self {
        AppError::internal(format!("env var error: {e}"))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status();
        let code = self.code();
        let detail = self.detail();

        let problem_details = ProblemDetails {
            type_: format!("https://concord.dev/errors/{}", code.to_uppercase()),
            title: Self::humanize_code(&code),
            status: status.as_u16(),
            detail,
            code,
        };

        HttpResponse::build(status)
            .content_type("application/problem+json")
            .json(problem_details)
    }
}
