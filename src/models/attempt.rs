// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::certificate::CertificateSummary;

/// Lifecycle state of an exam attempt.
///
/// PENDING is the only live state; the other three are terminal and no
/// transition ever leaves them. FLAGGED is a completed attempt that the
/// monitor marked as suspicious; the learner's score still stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttemptState {
    Pending,
    Completed,
    Flagged,
    Expired,
}

impl AttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::Pending => "PENDING",
            AttemptState::Completed => "COMPLETED",
            AttemptState::Flagged => "FLAGGED",
            AttemptState::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AttemptState::Pending),
            "COMPLETED" => Some(AttemptState::Completed),
            "FLAGGED" => Some(AttemptState::Flagged),
            "EXPIRED" => Some(AttemptState::Expired),
            _ => None,
        }
    }

    /// Finished attempts carry a score the learner can see.
    pub fn is_finished(&self) -> bool {
        matches!(self, AttemptState::Completed | AttemptState::Flagged)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptState::Pending)
    }
}

/// A single submitted answer: which option the learner picked for which
/// question. Unknown question ids and out-of-range choices are legal
/// input; they simply earn no credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: i64,
    pub choice_index: i32,
}

/// One timed instance of a learner taking a course exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub state: AttemptState,
    pub answers: Option<Vec<Answer>>,
    pub score: Option<i64>,
    pub passed: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ExamAttempt {
    /// Submission deadline for an exam of the given duration.
    pub fn deadline(&self, duration_minutes: i64) -> DateTime<Utc> {
        self.started_at + chrono::Duration::minutes(duration_minutes)
    }
}

/// Returned by `start`: the handle the learner submits against.
#[derive(Debug, Clone, Serialize)]
pub struct StartedExam {
    pub attempt_id: i64,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// Returned by `get_time_remaining`.
#[derive(Debug, Clone, Serialize)]
pub struct TimeRemaining {
    pub active: bool,
    pub remaining_seconds: i64,
    pub attempt_id: Option<i64>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Returned by `submit` once the attempt reaches a finished state.
/// `certificate` is present when the learner passed; its `pdf_url` may
/// still be null while the background pipeline renders the document.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub attempt_id: i64,
    pub score: i64,
    pub passed: bool,
    pub correct_count: usize,
    pub total_questions: usize,
    pub flagged: bool,
    pub certificate: Option<CertificateSummary>,
}

/// Latest finished attempt for a course, with the certificate if one
/// was earned.
#[derive(Debug, Clone, Serialize)]
pub struct ExamResults {
    pub attempt_id: i64,
    pub score: i64,
    pub passed: bool,
    pub answers: Vec<Answer>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub certificate: Option<CertificateSummary>,
}

/// One row of the learner's exam history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub attempt_id: i64,
    pub course_id: i64,
    pub state: AttemptState,
    pub score: i64,
    pub passed: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub certificate: Option<CertificateSummary>,
}
