// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::error::ExamError;
use crate::models::attempt::{Answer, AttemptState, ExamAttempt};
use crate::models::certificate::Certificate;
use crate::models::course::CourseExam;
use crate::models::question::Question;
use crate::models::user::Learner;
use crate::store::{ExamStore, FinalizeOutcome, FinalizedAttempt};

const ATTEMPT_COLUMNS: &str = "id, user_id, course_id, state, answers, score, passed, \
                               started_at, submitted_at, duration_seconds, created_at";

/// Postgres-backed store. Queries are bound at runtime so the crate
/// builds without a live database; the schema ships in `migrations/`.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the engine's schema migrations.
    pub async fn migrate(&self) -> Result<(), ExamError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ExamError::TransientIo(e.to_string()))
    }
}

/// Row shape of `exam_attempts`; `state` and `answers` need conversion
/// before they become model types.
#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: i64,
    user_id: i64,
    course_id: i64,
    state: String,
    answers: Option<Json<Vec<Answer>>>,
    score: Option<i64>,
    passed: Option<bool>,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    duration_seconds: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for ExamAttempt {
    type Error = ExamError;

    fn try_from(row: AttemptRow) -> Result<Self, ExamError> {
        let state = AttemptState::parse(&row.state).ok_or_else(|| {
            ExamError::TransientIo(format!("unknown attempt state '{}'", row.state))
        })?;
        Ok(ExamAttempt {
            id: row.id,
            user_id: row.user_id,
            course_id: row.course_id,
            state,
            answers: row.answers.map(|Json(a)| a),
            score: row.score,
            passed: row.passed,
            started_at: row.started_at,
            submitted_at: row.submitted_at,
            duration_seconds: row.duration_seconds,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    course_id: i64,
    question_number: i32,
    text: String,
    options: Json<Vec<String>>,
    correct_option: i32,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Question {
            id: row.id,
            course_id: row.course_id,
            question_number: row.question_number,
            text: row.text,
            options: row.options.0,
            correct_option: row.correct_option,
        }
    }
}

#[async_trait]
impl ExamStore for PostgresStore {
    async fn is_enrolled(&self, user_id: i64, course_id: i64) -> Result<bool, ExamError> {
        let enrolled: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM enrollments WHERE user_id = $1 AND course_id = $2)",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(enrolled)
    }

    async fn find_course(&self, course_id: i64) -> Result<Option<CourseExam>, ExamError> {
        let course = sqlx::query_as::<_, CourseExam>(
            "SELECT id, title, exam_duration_minutes, exam_pass_score FROM courses WHERE id = $1",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(course)
    }

    async fn find_learner(&self, user_id: i64) -> Result<Option<Learner>, ExamError> {
        let learner =
            sqlx::query_as::<_, Learner>("SELECT id, name, email FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(learner)
    }

    async fn load_questions(&self, course_id: i64) -> Result<Vec<Question>, ExamError> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            "SELECT id, course_id, question_number, text, options, correct_option \
             FROM questions WHERE course_id = $1 ORDER BY question_number ASC",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Question::from).collect())
    }

    async fn begin_attempt(
        &self,
        user_id: i64,
        course_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<ExamAttempt, ExamError> {
        let mut tx = self.pool.begin().await?;

        // Reconciliation: stale PENDING rows for the pair are
        // force-completed as failed before the new attempt appears.
        sqlx::query(
            "UPDATE exam_attempts SET state = 'EXPIRED', score = 0, passed = FALSE \
             WHERE user_id = $1 AND course_id = $2 AND state = 'PENDING'",
        )
        .bind(user_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "INSERT INTO exam_attempts (user_id, course_id, state, started_at, created_at) \
             VALUES ($1, $2, 'PENDING', $3, $3) RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(user_id)
        .bind(course_id)
        .bind(started_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn find_attempt(&self, attempt_id: i64) -> Result<Option<ExamAttempt>, ExamError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM exam_attempts WHERE id = $1"
        ))
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ExamAttempt::try_from).transpose()
    }

    async fn find_pending_attempt(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<ExamAttempt>, ExamError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM exam_attempts \
             WHERE user_id = $1 AND course_id = $2 AND state = 'PENDING' \
             ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ExamAttempt::try_from).transpose()
    }

    async fn expire_attempt(&self, attempt_id: i64, _now: DateTime<Utc>) -> Result<(), ExamError> {
        sqlx::query(
            "UPDATE exam_attempts SET state = 'EXPIRED', score = 0, passed = FALSE \
             WHERE id = $1 AND state = 'PENDING'",
        )
        .bind(attempt_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_attempt(
        &self,
        outcome: FinalizeOutcome,
    ) -> Result<FinalizedAttempt, ExamError> {
        let mut tx = self.pool.begin().await?;

        // Row lock so a duplicate retry serializes behind this
        // transaction and then fails the PENDING check.
        let current = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM exam_attempts \
             WHERE id = $1 AND user_id = $2 AND course_id = $3 FOR UPDATE"
        ))
        .bind(outcome.attempt_id)
        .bind(outcome.user_id)
        .bind(outcome.course_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ExamError::Forbidden("invalid exam attempt".to_string()))?;

        if current.state != AttemptState::Pending.as_str() {
            return Err(ExamError::Forbidden(
                "exam attempt is already finished".to_string(),
            ));
        }

        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "UPDATE exam_attempts \
             SET state = $2, answers = $3, score = $4, passed = $5, \
                 submitted_at = $6, duration_seconds = $7 \
             WHERE id = $1 RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(outcome.attempt_id)
        .bind(outcome.state.as_str())
        .bind(Json(&outcome.answers))
        .bind(outcome.score)
        .bind(outcome.passed)
        .bind(outcome.submitted_at)
        .bind(outcome.duration_seconds)
        .fetch_one(&mut *tx)
        .await?;

        let (certificate, certificate_created) = match &outcome.certificate_number {
            Some(number) => {
                let existing = sqlx::query_as::<_, Certificate>(
                    "SELECT id, user_id, course_id, exam_attempt_id, certificate_number, \
                            pdf_url, is_valid, issued_at \
                     FROM certificates \
                     WHERE user_id = $1 AND course_id = $2 AND is_valid FOR UPDATE",
                )
                .bind(outcome.user_id)
                .bind(outcome.course_id)
                .fetch_optional(&mut *tx)
                .await?;

                match existing {
                    Some(cert) => (Some(cert), false),
                    None => {
                        let cert = sqlx::query_as::<_, Certificate>(
                            "INSERT INTO certificates \
                             (user_id, course_id, exam_attempt_id, certificate_number, issued_at) \
                             VALUES ($1, $2, $3, $4, $5) \
                             RETURNING id, user_id, course_id, exam_attempt_id, \
                                       certificate_number, pdf_url, is_valid, issued_at",
                        )
                        .bind(outcome.user_id)
                        .bind(outcome.course_id)
                        .bind(outcome.attempt_id)
                        .bind(number)
                        .bind(outcome.submitted_at)
                        .fetch_one(&mut *tx)
                        .await?;
                        (Some(cert), true)
                    }
                }
            }
            None => (None, false),
        };

        tx.commit().await?;

        Ok(FinalizedAttempt {
            attempt: row.try_into()?,
            certificate,
            certificate_created,
        })
    }

    async fn set_certificate_pdf_url(
        &self,
        certificate_id: i64,
        pdf_url: &str,
    ) -> Result<(), ExamError> {
        sqlx::query("UPDATE certificates SET pdf_url = $2 WHERE id = $1")
            .bind(certificate_id)
            .bind(pdf_url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_certificate(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<Certificate>, ExamError> {
        let cert = sqlx::query_as::<_, Certificate>(
            "SELECT id, user_id, course_id, exam_attempt_id, certificate_number, \
                    pdf_url, is_valid, issued_at \
             FROM certificates WHERE user_id = $1 AND course_id = $2 AND is_valid",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cert)
    }

    async fn find_certificate_by_id(&self, id: i64) -> Result<Option<Certificate>, ExamError> {
        let cert = sqlx::query_as::<_, Certificate>(
            "SELECT id, user_id, course_id, exam_attempt_id, certificate_number, \
                    pdf_url, is_valid, issued_at \
             FROM certificates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cert)
    }

    async fn find_certificate_by_number(
        &self,
        certificate_number: &str,
    ) -> Result<Option<Certificate>, ExamError> {
        let cert = sqlx::query_as::<_, Certificate>(
            "SELECT id, user_id, course_id, exam_attempt_id, certificate_number, \
                    pdf_url, is_valid, issued_at \
             FROM certificates WHERE certificate_number = $1",
        )
        .bind(certificate_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cert)
    }

    async fn list_finished_attempts(
        &self,
        user_id: i64,
        course_id: Option<i64>,
    ) -> Result<Vec<ExamAttempt>, ExamError> {
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM exam_attempts \
             WHERE user_id = $1 AND ($2::BIGINT IS NULL OR course_id = $2) \
               AND state IN ('COMPLETED', 'FLAGGED') \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ExamAttempt::try_from).collect()
    }

    async fn recent_attempts(
        &self,
        user_id: i64,
        course_id: i64,
        limit: usize,
    ) -> Result<Vec<ExamAttempt>, ExamError> {
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM exam_attempts \
             WHERE user_id = $1 AND course_id = $2 \
             ORDER BY started_at DESC, id DESC LIMIT $3"
        ))
        .bind(user_id)
        .bind(course_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ExamAttempt::try_from).collect()
    }
}
