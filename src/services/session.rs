// src/services/session.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::ExamConfig;
use crate::error::ExamError;
use crate::lock::{SessionLockStore, session_key, start_guard_key};
use crate::models::attempt::{
    Answer, AttemptState, ExamResults, HistoryEntry, StartedExam, SubmitReceipt, TimeRemaining,
};
use crate::models::certificate::CertificateSummary;
use crate::models::course::CourseExam;
use crate::models::question::ExamPaper;
use crate::services::certificate::{CertificateIssuer, CertificatePipeline};
use crate::services::monitoring::ExamMonitor;
use crate::services::scoring;
use crate::store::{ExamStore, FinalizeOutcome};

/// Orchestrates the exam attempt lifecycle for one deployment.
///
/// The lock store's session entry, not the attempt rows, decides
/// whether an attempt is in flight, and expiry is evaluated lazily
/// whenever an operation touches a (learner, course) pair. There is no
/// background sweeper.
pub struct ExamSessionManager {
    store: Arc<dyn ExamStore>,
    lock: Arc<dyn SessionLockStore>,
    monitor: ExamMonitor,
    pipeline: CertificatePipeline,
    config: ExamConfig,
}

impl ExamSessionManager {
    /// Wires the manager together and spawns the certificate pipeline
    /// worker; must be called within a Tokio runtime.
    pub fn new(
        store: Arc<dyn ExamStore>,
        lock: Arc<dyn SessionLockStore>,
        issuer: Arc<CertificateIssuer>,
        config: ExamConfig,
    ) -> Self {
        let monitor = ExamMonitor::new(store.clone(), lock.clone(), &config);
        let pipeline = CertificatePipeline::spawn(issuer);
        Self {
            store,
            lock,
            monitor,
            pipeline,
            config,
        }
    }

    pub fn monitor(&self) -> &ExamMonitor {
        &self.monitor
    }

    /// Starts a timed attempt. Exactly one of two concurrent calls for
    /// the same (learner, course) succeeds; the other sees
    /// `AlreadyInProgress`.
    pub async fn start(&self, user_id: i64, course_id: i64) -> Result<StartedExam, ExamError> {
        self.ensure_enrolled(user_id, course_id).await?;
        let course = self.require_course(course_id).await?;
        let now = Utc::now();

        let skey = session_key(user_id, course_id);
        let gkey = start_guard_key(user_id, course_id);
        if let Some(value) = self.lock.get(&skey).await? {
            if self.session_is_live(&value, &course, now).await? {
                return Err(ExamError::AlreadyInProgress);
            }
            // The entry pointed at a finished or over-deadline attempt;
            // it has been reconciled, clear both entries and continue.
            self.lock.del(&skey).await?;
            self.lock.del(&gkey).await?;
        }

        // Guard closing the check-then-set race between two concurrent
        // starts. It stays in place until submit or expiry clears it,
        // so a straggling concurrent start cannot reacquire it and
        // clobber the fresh session; its TTL is the crash backstop.
        if !self
            .lock
            .set_nx(&gkey, "held", self.config.start_guard_ttl_secs)
            .await?
        {
            return Err(ExamError::AlreadyInProgress);
        }

        match self.start_locked(user_id, course_id, &course, now, &skey).await {
            Ok(started) => {
                tracing::info!(
                    "Started exam attempt {} for user {} in course {}",
                    started.attempt_id,
                    user_id,
                    course_id
                );
                Ok(started)
            }
            Err(e) => {
                // No orphaned locks: release everything before
                // propagating.
                self.clear_session(user_id, course_id).await;
                Err(e)
            }
        }
    }

    async fn start_locked(
        &self,
        user_id: i64,
        course_id: i64,
        course: &CourseExam,
        now: DateTime<Utc>,
        skey: &str,
    ) -> Result<StartedExam, ExamError> {
        let attempt = self.store.begin_attempt(user_id, course_id, now).await?;

        let ttl = course.exam_duration_minutes.max(0) as u64 * 60 + self.config.session_grace_secs;
        if !self
            .lock
            .set_nx(skey, &attempt.id.to_string(), ttl)
            .await?
        {
            return Err(ExamError::TransientIo(
                "session entry reappeared during start".to_string(),
            ));
        }

        Ok(StartedExam {
            attempt_id: attempt.id,
            started_at: attempt.started_at,
            deadline: attempt.deadline(course.exam_duration_minutes),
            duration_minutes: course.exam_duration_minutes,
        })
    }

    /// Whether the session entry points at a PENDING attempt that is
    /// still inside its time box. Over-deadline attempts are
    /// force-expired on the way (lazy reconciliation), and stale
    /// entries for finished attempts report not-live.
    async fn session_is_live(
        &self,
        session_value: &str,
        course: &CourseExam,
        now: DateTime<Utc>,
    ) -> Result<bool, ExamError> {
        let Some(attempt_id) = session_value.parse::<i64>().ok() else {
            return Ok(false);
        };
        let Some(attempt) = self.store.find_attempt(attempt_id).await? else {
            return Ok(false);
        };
        if attempt.state != AttemptState::Pending {
            return Ok(false);
        }
        if now > attempt.deadline(course.exam_duration_minutes) {
            self.store.expire_attempt(attempt.id, now).await?;
            tracing::info!("Expired stale exam attempt {}", attempt.id);
            return Ok(false);
        }
        Ok(true)
    }

    /// Submits answers for the attempt the session entry points at.
    ///
    /// The finalization transaction writes score, final state and,
    /// when passed, the certificate row, all atomically; the session
    /// is released strictly after commit, and certificate rendering is
    /// handed to the background pipeline so the response never waits
    /// on it.
    pub async fn submit(
        &self,
        user_id: i64,
        course_id: i64,
        attempt_id: i64,
        answers: Vec<Answer>,
    ) -> Result<SubmitReceipt, ExamError> {
        self.ensure_enrolled(user_id, course_id).await?;
        let course = self.require_course(course_id).await?;

        // The session entry is the authority: a stale attempt id, a
        // replayed retry or an expired session all fail here.
        let skey = session_key(user_id, course_id);
        match self.lock.get(&skey).await? {
            Some(value) if value == attempt_id.to_string() => {}
            _ => {
                return Err(ExamError::Forbidden(
                    "no active exam session for this attempt".to_string(),
                ));
            }
        }

        let attempt = self
            .store
            .find_attempt(attempt_id)
            .await?
            .filter(|a| a.user_id == user_id && a.course_id == course_id)
            .ok_or_else(|| ExamError::Forbidden("invalid exam attempt".to_string()))?;
        if attempt.state.is_terminal() {
            return Err(ExamError::Forbidden(
                "exam attempt is already finished".to_string(),
            ));
        }

        let now = Utc::now();
        if now > attempt.deadline(course.exam_duration_minutes) {
            self.store.expire_attempt(attempt.id, now).await?;
            self.clear_session(user_id, course_id).await;
            return Err(ExamError::Expired);
        }

        let questions = self.store.load_questions(course_id).await?;
        let card = scoring::score_submission(&answers, &questions, course.exam_pass_score);

        // Observational only: a monitoring outage must not block the
        // submission.
        let flagged = match self.monitor.assess(user_id, course_id).await {
            Ok(flagged) => flagged,
            Err(e) => {
                tracing::warn!("Exam monitoring check failed: {}", e);
                false
            }
        };

        let finalized = self
            .store
            .finalize_attempt(FinalizeOutcome {
                attempt_id,
                user_id,
                course_id,
                answers,
                score: card.score,
                passed: card.passed,
                state: if flagged {
                    AttemptState::Flagged
                } else {
                    AttemptState::Completed
                },
                submitted_at: now,
                duration_seconds: (now - attempt.started_at).num_seconds(),
                certificate_number: card.passed.then(|| {
                    CertificateIssuer::certificate_number(user_id, course_id, attempt_id, now)
                }),
            })
            .await?;

        // Strictly after commit: a crash inside the transaction leaves
        // the session intact, and a retry reports "already in progress"
        // instead of corrupting state.
        self.clear_session(user_id, course_id).await;

        if finalized.certificate_created {
            if let Some(certificate) = &finalized.certificate {
                self.pipeline.enqueue(certificate.id);
            }
        }

        tracing::info!(
            "User {} finished exam attempt {} in course {}: score {}, passed {}",
            user_id,
            attempt_id,
            course_id,
            card.score,
            card.passed
        );

        Ok(SubmitReceipt {
            attempt_id,
            score: card.score,
            passed: card.passed,
            correct_count: card.correct_count,
            total_questions: card.total_questions,
            flagged,
            certificate: finalized.certificate.map(|c| c.summary()),
        })
    }

    /// Seconds left on the live attempt, expiring it lazily when the
    /// deadline has passed; there is no sweeper.
    pub async fn get_time_remaining(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<TimeRemaining, ExamError> {
        self.ensure_enrolled(user_id, course_id).await?;
        let course = self.require_course(course_id).await?;

        let Some(attempt) = self.store.find_pending_attempt(user_id, course_id).await? else {
            return Ok(inactive());
        };

        let deadline = attempt.deadline(course.exam_duration_minutes);
        let now = Utc::now();
        if now > deadline {
            self.store.expire_attempt(attempt.id, now).await?;
            self.clear_session(user_id, course_id).await;
            tracing::info!("Expired exam attempt {} on time check", attempt.id);
            return Ok(inactive());
        }

        Ok(TimeRemaining {
            active: true,
            remaining_seconds: (deadline - now).num_seconds(),
            attempt_id: Some(attempt.id),
            deadline: Some(deadline),
        })
    }

    /// The paper a learner sees when opening the exam: course
    /// parameters plus the ordered questions with the answer key
    /// withheld.
    pub async fn exam_paper(&self, user_id: i64, course_id: i64) -> Result<ExamPaper, ExamError> {
        self.ensure_enrolled(user_id, course_id).await?;
        let course = self.require_course(course_id).await?;
        let questions = self.store.load_questions(course_id).await?;

        Ok(ExamPaper {
            course_id,
            course_title: course.title,
            exam_duration_minutes: course.exam_duration_minutes,
            pass_score: course.exam_pass_score,
            total_questions: questions.len(),
            questions: questions.iter().map(|q| q.public()).collect(),
        })
    }

    /// Latest finished attempt for the course, with the certificate if
    /// one was earned. `None` when the learner never finished an exam.
    pub async fn get_results(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<ExamResults>, ExamError> {
        self.ensure_enrolled(user_id, course_id).await?;

        let attempts = self
            .store
            .list_finished_attempts(user_id, Some(course_id))
            .await?;
        let Some(latest) = attempts.into_iter().next() else {
            return Ok(None);
        };

        let certificate = self.store.find_certificate(user_id, course_id).await?;
        Ok(Some(ExamResults {
            attempt_id: latest.id,
            score: latest.score.unwrap_or(0),
            passed: latest.passed.unwrap_or(false),
            answers: latest.answers.unwrap_or_default(),
            submitted_at: latest.submitted_at,
            certificate: certificate.map(|c| c.summary()),
        }))
    }

    /// Finished attempts newest first, optionally restricted to one
    /// course, each with its certificate when the attempt passed.
    pub async fn list_history(
        &self,
        user_id: i64,
        course_id: Option<i64>,
    ) -> Result<Vec<HistoryEntry>, ExamError> {
        if let Some(course_id) = course_id {
            self.ensure_enrolled(user_id, course_id).await?;
        }

        let attempts = self.store.list_finished_attempts(user_id, course_id).await?;

        let mut certificates: HashMap<i64, Option<CertificateSummary>> = HashMap::new();
        let mut history = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            let passed = attempt.passed.unwrap_or(false);
            let certificate = if passed {
                match certificates.entry(attempt.course_id) {
                    std::collections::hash_map::Entry::Occupied(e) => e.get().clone(),
                    std::collections::hash_map::Entry::Vacant(e) => {
                        let cert = self
                            .store
                            .find_certificate(user_id, attempt.course_id)
                            .await?
                            .map(|c| c.summary());
                        e.insert(cert).clone()
                    }
                }
            } else {
                None
            };

            history.push(HistoryEntry {
                attempt_id: attempt.id,
                course_id: attempt.course_id,
                state: attempt.state,
                score: attempt.score.unwrap_or(0),
                passed,
                submitted_at: attempt.submitted_at,
                duration_seconds: attempt.duration_seconds,
                certificate,
            });
        }
        Ok(history)
    }

    async fn ensure_enrolled(&self, user_id: i64, course_id: i64) -> Result<(), ExamError> {
        if self.store.is_enrolled(user_id, course_id).await? {
            Ok(())
        } else {
            Err(ExamError::Forbidden(
                "user is not enrolled in this course".to_string(),
            ))
        }
    }

    async fn require_course(&self, course_id: i64) -> Result<CourseExam, ExamError> {
        self.store
            .find_course(course_id)
            .await?
            .ok_or_else(|| ExamError::NotFound("course not found".to_string()))
    }

    /// Best-effort deletion of the pair's lock-store entries; the TTL
    /// is the backstop when the lock store is unreachable.
    async fn clear_session(&self, user_id: i64, course_id: i64) {
        for key in [
            session_key(user_id, course_id),
            start_guard_key(user_id, course_id),
        ] {
            if let Err(e) = self.lock.del(&key).await {
                tracing::warn!("Failed to clear lock entry {}: {}", key, e);
            }
        }
    }
}

fn inactive() -> TimeRemaining {
    TimeRemaining {
        active: false,
        remaining_seconds: 0,
        attempt_id: None,
        deadline: None,
    }
}
