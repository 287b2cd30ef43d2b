// src/store/memory.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ExamError;
use crate::models::attempt::{AttemptState, ExamAttempt};
use crate::models::certificate::Certificate;
use crate::models::course::CourseExam;
use crate::models::question::Question;
use crate::models::user::Learner;
use crate::store::{ExamStore, FinalizeOutcome, FinalizedAttempt};

/// In-process store backed by a mutex-guarded set of tables.
///
/// The mutex plays the role of the transaction boundary: each trait
/// method takes it once and applies its whole read-modify-write under
/// it. Serves tests, demos and single-node embedding.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    courses: HashMap<i64, CourseExam>,
    learners: HashMap<i64, Learner>,
    enrollments: HashSet<(i64, i64)>,
    questions: Vec<Question>,
    attempts: BTreeMap<i64, ExamAttempt>,
    certificates: BTreeMap<i64, Certificate>,
    next_attempt_id: i64,
    next_certificate_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_course(&self, course: CourseExam) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.courses.insert(course.id, course);
    }

    pub fn seed_learner(&self, learner: Learner) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.learners.insert(learner.id, learner);
    }

    pub fn enroll(&self, user_id: i64, course_id: i64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.enrollments.insert((user_id, course_id));
    }

    pub fn seed_question(&self, question: Question) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.questions.push(question);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, ExamError> {
        self.inner
            .lock()
            .map_err(|_| ExamError::TransientIo("memory store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn is_enrolled(&self, user_id: i64, course_id: i64) -> Result<bool, ExamError> {
        Ok(self.lock()?.enrollments.contains(&(user_id, course_id)))
    }

    async fn find_course(&self, course_id: i64) -> Result<Option<CourseExam>, ExamError> {
        Ok(self.lock()?.courses.get(&course_id).cloned())
    }

    async fn find_learner(&self, user_id: i64) -> Result<Option<Learner>, ExamError> {
        Ok(self.lock()?.learners.get(&user_id).cloned())
    }

    async fn load_questions(&self, course_id: i64) -> Result<Vec<Question>, ExamError> {
        let inner = self.lock()?;
        let mut questions: Vec<Question> = inner
            .questions
            .iter()
            .filter(|q| q.course_id == course_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.question_number);
        Ok(questions)
    }

    async fn begin_attempt(
        &self,
        user_id: i64,
        course_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<ExamAttempt, ExamError> {
        let mut inner = self.lock()?;

        // Reconciliation half of the transaction: any PENDING row left
        // behind by a crash or abandonment is force-completed.
        for attempt in inner.attempts.values_mut() {
            if attempt.user_id == user_id
                && attempt.course_id == course_id
                && attempt.state == AttemptState::Pending
            {
                attempt.state = AttemptState::Expired;
                attempt.score = Some(0);
                attempt.passed = Some(false);
            }
        }

        inner.next_attempt_id += 1;
        let attempt = ExamAttempt {
            id: inner.next_attempt_id,
            user_id,
            course_id,
            state: AttemptState::Pending,
            answers: None,
            score: None,
            passed: None,
            started_at,
            submitted_at: None,
            duration_seconds: None,
            created_at: started_at,
        };
        inner.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn find_attempt(&self, attempt_id: i64) -> Result<Option<ExamAttempt>, ExamError> {
        Ok(self.lock()?.attempts.get(&attempt_id).cloned())
    }

    async fn find_pending_attempt(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<ExamAttempt>, ExamError> {
        let inner = self.lock()?;
        Ok(inner
            .attempts
            .values()
            .filter(|a| {
                a.user_id == user_id
                    && a.course_id == course_id
                    && a.state == AttemptState::Pending
            })
            .max_by_key(|a| a.started_at)
            .cloned())
    }

    async fn expire_attempt(&self, attempt_id: i64, _now: DateTime<Utc>) -> Result<(), ExamError> {
        let mut inner = self.lock()?;
        if let Some(attempt) = inner.attempts.get_mut(&attempt_id) {
            if attempt.state == AttemptState::Pending {
                attempt.state = AttemptState::Expired;
                attempt.score = Some(0);
                attempt.passed = Some(false);
            }
        }
        Ok(())
    }

    async fn finalize_attempt(
        &self,
        outcome: FinalizeOutcome,
    ) -> Result<FinalizedAttempt, ExamError> {
        let mut inner = self.lock()?;

        let attempt = inner
            .attempts
            .get(&outcome.attempt_id)
            .filter(|a| a.user_id == outcome.user_id && a.course_id == outcome.course_id)
            .cloned()
            .ok_or_else(|| ExamError::Forbidden("invalid exam attempt".to_string()))?;
        if attempt.state != AttemptState::Pending {
            return Err(ExamError::Forbidden(
                "exam attempt is already finished".to_string(),
            ));
        }

        let attempt = {
            let entry = inner
                .attempts
                .get_mut(&outcome.attempt_id)
                .ok_or_else(|| ExamError::Forbidden("invalid exam attempt".to_string()))?;
            entry.state = outcome.state;
            entry.answers = Some(outcome.answers.clone());
            entry.score = Some(outcome.score);
            entry.passed = Some(outcome.passed);
            entry.submitted_at = Some(outcome.submitted_at);
            entry.duration_seconds = Some(outcome.duration_seconds);
            entry.clone()
        };

        let (certificate, certificate_created) = match &outcome.certificate_number {
            Some(number) => {
                let existing = inner
                    .certificates
                    .values()
                    .find(|c| {
                        c.user_id == outcome.user_id
                            && c.course_id == outcome.course_id
                            && c.is_valid
                    })
                    .cloned();
                match existing {
                    Some(cert) => (Some(cert), false),
                    None => {
                        inner.next_certificate_id += 1;
                        let cert = Certificate {
                            id: inner.next_certificate_id,
                            user_id: outcome.user_id,
                            course_id: outcome.course_id,
                            exam_attempt_id: outcome.attempt_id,
                            certificate_number: number.clone(),
                            pdf_url: None,
                            is_valid: true,
                            issued_at: outcome.submitted_at,
                        };
                        inner.certificates.insert(cert.id, cert.clone());
                        (Some(cert), true)
                    }
                }
            }
            None => (None, false),
        };

        Ok(FinalizedAttempt {
            attempt,
            certificate,
            certificate_created,
        })
    }

    async fn set_certificate_pdf_url(
        &self,
        certificate_id: i64,
        pdf_url: &str,
    ) -> Result<(), ExamError> {
        let mut inner = self.lock()?;
        if let Some(cert) = inner.certificates.get_mut(&certificate_id) {
            cert.pdf_url = Some(pdf_url.to_string());
        }
        Ok(())
    }

    async fn find_certificate(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<Certificate>, ExamError> {
        let inner = self.lock()?;
        Ok(inner
            .certificates
            .values()
            .find(|c| c.user_id == user_id && c.course_id == course_id && c.is_valid)
            .cloned())
    }

    async fn find_certificate_by_id(&self, id: i64) -> Result<Option<Certificate>, ExamError> {
        Ok(self.lock()?.certificates.get(&id).cloned())
    }

    async fn find_certificate_by_number(
        &self,
        certificate_number: &str,
    ) -> Result<Option<Certificate>, ExamError> {
        let inner = self.lock()?;
        Ok(inner
            .certificates
            .values()
            .find(|c| c.certificate_number == certificate_number)
            .cloned())
    }

    async fn list_finished_attempts(
        &self,
        user_id: i64,
        course_id: Option<i64>,
    ) -> Result<Vec<ExamAttempt>, ExamError> {
        let inner = self.lock()?;
        let mut attempts: Vec<ExamAttempt> = inner
            .attempts
            .values()
            .filter(|a| {
                a.user_id == user_id
                    && a.state.is_finished()
                    && course_id.is_none_or(|c| a.course_id == c)
            })
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(attempts)
    }

    async fn recent_attempts(
        &self,
        user_id: i64,
        course_id: i64,
        limit: usize,
    ) -> Result<Vec<ExamAttempt>, ExamError> {
        let inner = self.lock()?;
        let mut attempts: Vec<ExamAttempt> = inner
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.course_id == course_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        attempts.truncate(limit);
        Ok(attempts)
    }
}
