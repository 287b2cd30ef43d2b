// src/store/mod.rs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ExamError;
use crate::models::attempt::{Answer, AttemptState, ExamAttempt};
use crate::models::certificate::Certificate;
use crate::models::course::CourseExam;
use crate::models::question::Question;
use crate::models::user::Learner;

/// Everything the submit transition writes, applied in one transaction.
///
/// When `certificate_number` is set the store must find-or-create the
/// certificate row for (user, course) atomically with the score write,
/// so two racing submissions cannot double-issue.
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    pub attempt_id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub answers: Vec<Answer>,
    pub score: i64,
    pub passed: bool,
    /// `Completed`, or `Flagged` when the monitor found the attempt
    /// suspicious.
    pub state: AttemptState,
    pub submitted_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub certificate_number: Option<String>,
}

/// Result of a finalization transaction. `certificate_created` is true
/// only when this call inserted the row, the trigger for the async
/// issuance pipeline.
#[derive(Debug, Clone)]
pub struct FinalizedAttempt {
    pub attempt: ExamAttempt,
    pub certificate: Option<Certificate>,
    pub certificate_created: bool,
}

/// Transactional persistence for attempts and certificates, plus the
/// simple lookups the engine consumes (enrollment, course parameters,
/// question snapshots, learner identity).
///
/// Every compound method executes as a single transaction. Rows for one
/// (user, course) pair are mutated only through `begin_attempt`,
/// `expire_attempt` and `finalize_attempt`; everything else is
/// read-only.
#[async_trait]
pub trait ExamStore: Send + Sync {
    async fn is_enrolled(&self, user_id: i64, course_id: i64) -> Result<bool, ExamError>;

    async fn find_course(&self, course_id: i64) -> Result<Option<CourseExam>, ExamError>;

    async fn find_learner(&self, user_id: i64) -> Result<Option<Learner>, ExamError>;

    /// Question snapshot for a course, ordered by question number.
    async fn load_questions(&self, course_id: i64) -> Result<Vec<Question>, ExamError>;

    /// In one transaction: force-complete any lingering PENDING attempt
    /// for the pair as EXPIRED (score 0, failed), then insert a fresh
    /// PENDING attempt started at `started_at`.
    async fn begin_attempt(
        &self,
        user_id: i64,
        course_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<ExamAttempt, ExamError>;

    async fn find_attempt(&self, attempt_id: i64) -> Result<Option<ExamAttempt>, ExamError>;

    async fn find_pending_attempt(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<ExamAttempt>, ExamError>;

    /// Lazy-expiry transition: EXPIRED, score 0, failed. A no-op if the
    /// attempt is no longer PENDING.
    async fn expire_attempt(&self, attempt_id: i64, now: DateTime<Utc>) -> Result<(), ExamError>;

    /// Applies the submit transition. Fails `Forbidden` unless the
    /// attempt is still PENDING and belongs to (user, course), which
    /// makes duplicate retries of an already-finished attempt safe.
    async fn finalize_attempt(
        &self,
        outcome: FinalizeOutcome,
    ) -> Result<FinalizedAttempt, ExamError>;

    async fn set_certificate_pdf_url(
        &self,
        certificate_id: i64,
        pdf_url: &str,
    ) -> Result<(), ExamError>;

    async fn find_certificate(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<Certificate>, ExamError>;

    async fn find_certificate_by_id(&self, id: i64) -> Result<Option<Certificate>, ExamError>;

    async fn find_certificate_by_number(
        &self,
        certificate_number: &str,
    ) -> Result<Option<Certificate>, ExamError>;

    /// Finished (COMPLETED or FLAGGED) attempts, newest first,
    /// optionally restricted to one course.
    async fn list_finished_attempts(
        &self,
        user_id: i64,
        course_id: Option<i64>,
    ) -> Result<Vec<ExamAttempt>, ExamError>;

    /// Last `limit` attempts for the pair in any state, newest first.
    /// Consumed by the monitor's rapid-retry check.
    async fn recent_attempts(
        &self,
        user_id: i64,
        course_id: i64,
        limit: usize,
    ) -> Result<Vec<ExamAttempt>, ExamError>;
}
