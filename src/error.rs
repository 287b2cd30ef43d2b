// src/error.rs

use std::fmt;

/// Central error enum for the exam engine.
///
/// The enum is closed on purpose: callers (the HTTP layer, a job runner)
/// match on it exhaustively instead of sorting through heterogeneous
/// error types. Malformed answers are *not* an error; they simply score
/// zero credit in the scoring engine.
#[derive(Debug)]
pub enum ExamError {
    /// Course, attempt, learner or question set does not exist.
    NotFound(String),

    /// Not enrolled, or the submission does not belong to the caller's
    /// active session (stale attempt id, replayed retry, expired session).
    Forbidden(String),

    /// An exam session is already in flight for this (learner, course).
    AlreadyInProgress,

    /// The attempt's deadline has passed; it has been force-expired.
    Expired,

    /// Store / lock / blob / mail failure. Retries of start and submit
    /// are safe: start reconciles stale state, submit re-checks the
    /// session token and the PENDING state.
    TransientIo(String),
}

impl fmt::Display for ExamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExamError::NotFound(msg) => write!(f, "not found: {}", msg),
            ExamError::Forbidden(msg) => write!(f, "forbidden: {}", msg),
            ExamError::AlreadyInProgress => write!(f, "an exam session is already in progress"),
            ExamError::Expired => write!(f, "the exam deadline has passed"),
            ExamError::TransientIo(msg) => write!(f, "transient I/O failure: {}", msg),
        }
    }
}

impl std::error::Error for ExamError {}

/// Database failures surface as `TransientIo`, allowing `?` on queries.
impl From<sqlx::Error> for ExamError {
    fn from(err: sqlx::Error) -> Self {
        ExamError::TransientIo(err.to_string())
    }
}

impl From<serde_json::Error> for ExamError {
    fn from(err: serde_json::Error) -> Self {
        ExamError::TransientIo(err.to_string())
    }
}
