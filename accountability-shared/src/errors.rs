use serde::{Deserialize, Serialize};

/// Application error codes following the pattern E{service}{sequence}.
///
/// Ranges:
/// - E80xx: Preferences (C1)
/// - E81xx: Compatibility engine (C2)
/// - E82xx: Matching queue (C3)
/// - E83xx: Partnership state machine (C4)
/// - E84xx: Check-in / streak engine (C5)
/// - E85xx: Health scorer (C6)
/// - E89xx: Infrastructure / shared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Preferences (E80x)
    InvalidTimezone,
    OverlappingWorkingHours,
    PreferencesNotFound,

    // Compatibility engine (E81x)
    InvalidPreferencesForScoring,

    // Matching queue (E82x)
    AlreadyQueued,
    NotQueued,
    QueueIneligible,

    // Partnership state machine (E83x)
    SelfPartner,
    DuplicatePartnership,
    PartnershipNotFound,
    NotParticipant,
    NotRecipient,
    NotInitiator,
    WrongState,
    LimitExceeded,

    // Check-in / streak engine (E84x)
    DuplicateCheckIn,
    CheckInWrongState,

    // Health scorer (E85x)
    HealthNotFound,

    // Shared / infrastructure (E89x)
    Internal,
    Transient,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTimezone => "E8001",
            Self::OverlappingWorkingHours => "E8002",
            Self::PreferencesNotFound => "E8003",

            Self::InvalidPreferencesForScoring => "E8101",

            Self::AlreadyQueued => "E8201",
            Self::NotQueued => "E8202",
            Self::QueueIneligible => "E8203",

            Self::SelfPartner => "E8301",
            Self::DuplicatePartnership => "E8302",
            Self::PartnershipNotFound => "E8303",
            Self::NotParticipant => "E8304",
            Self::NotRecipient => "E8305",
            Self::NotInitiator => "E8306",
            Self::WrongState => "E8307",
            Self::LimitExceeded => "E8308",

            Self::DuplicateCheckIn => "E8401",
            Self::CheckInWrongState => "E8402",

            Self::HealthNotFound => "E8501",

            Self::Internal => "E8901",
            Self::Transient => "E8902",
        }
    }
}

/// The seven error kinds from the MPC error-handling design. Every
/// component-internal error is converted into one of these at its
/// public boundary; nothing crosses the boundary as a raw store error.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid: {message}")]
    Invalid { code: ErrorCode, message: String },

    #[error("not found: {message}")]
    NotFound { code: ErrorCode, message: String },

    #[error("forbidden: {message}")]
    Forbidden { code: ErrorCode, message: String },

    #[error("conflict: {message}")]
    Conflict { code: ErrorCode, message: String },

    #[error("wrong state: expected transition from {current} is not allowed")]
    WrongState { current: String },

    #[error("limit exceeded: {message}")]
    LimitExceeded { message: String },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl AppError {
    pub fn invalid(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Invalid { code, message: message.into() }
    }

    pub fn not_found(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::NotFound { code, message: message.into() }
    }

    pub fn forbidden(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Forbidden { code, message: message.into() }
    }

    pub fn conflict(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Conflict { code, message: message.into() }
    }

    pub fn wrong_state(current: impl std::fmt::Display) -> Self {
        Self::WrongState { current: current.to_string() }
    }

    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        Self::LimitExceeded { message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Coarse kind, useful for callers that branch on kind rather than
    /// the specific `ErrorCode` (e.g. scheduled jobs deciding whether
    /// to retry).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;
