// src/services/monitoring.rs

use std::sync::Arc;

use crate::config::ExamConfig;
use crate::error::ExamError;
use crate::lock::{SessionLockStore, flag_marker_key};
use crate::models::attempt::ExamAttempt;
use crate::store::ExamStore;

/// Detects rapid-retry patterns across a learner's attempts on one
/// course. Purely observational: the session manager records the
/// verdict in the attempt's final state, but the learner's flow is
/// never blocked and the score stands.
pub struct ExamMonitor {
    store: Arc<dyn ExamStore>,
    lock: Arc<dyn SessionLockStore>,
    window: usize,
    threshold_secs: i64,
    marker_ttl_secs: u64,
}

impl ExamMonitor {
    pub fn new(
        store: Arc<dyn ExamStore>,
        lock: Arc<dyn SessionLockStore>,
        config: &ExamConfig,
    ) -> Self {
        Self {
            store,
            lock,
            window: config.monitor_window,
            threshold_secs: config.monitor_threshold_secs,
            marker_ttl_secs: config.flag_marker_ttl_secs,
        }
    }

    /// Inspects the last few attempts for the pair. On suspicion, logs
    /// a warning and writes a TTL'd audit marker; returns the verdict.
    pub async fn assess(&self, user_id: i64, course_id: i64) -> Result<bool, ExamError> {
        let attempts = self
            .store
            .recent_attempts(user_id, course_id, self.window)
            .await?;

        if !rapid_retry(&attempts, self.threshold_secs) {
            return Ok(false);
        }

        tracing::warn!(
            "Suspicious exam activity for user {} in course {}: attempts closer than {}s apart",
            user_id,
            course_id,
            self.threshold_secs
        );
        // Best-effort marker; the FLAGGED state carries the verdict.
        if let Err(e) = self
            .lock
            .set_nx(&flag_marker_key(user_id, course_id), "1", self.marker_ttl_secs)
            .await
        {
            tracing::warn!("Failed to record audit marker: {}", e);
        }
        Ok(true)
    }

    /// Whether an audit marker is currently live for the pair.
    pub async fn is_flagged(&self, user_id: i64, course_id: i64) -> Result<bool, ExamError> {
        Ok(self
            .lock
            .get(&flag_marker_key(user_id, course_id))
            .await?
            .is_some())
    }
}

/// True iff two consecutive attempts (newest first) started less than
/// `threshold_secs` apart.
fn rapid_retry(attempts: &[ExamAttempt], threshold_secs: i64) -> bool {
    attempts.windows(2).any(|pair| {
        let gap = pair[0].started_at - pair[1].started_at;
        gap.num_seconds() < threshold_secs
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attempt::AttemptState;
    use chrono::{Duration, TimeZone, Utc};

    fn attempt(id: i64, started_offset_secs: i64) -> ExamAttempt {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let started_at = base + Duration::seconds(started_offset_secs);
        ExamAttempt {
            id,
            user_id: 7,
            course_id: 3,
            state: AttemptState::Completed,
            answers: None,
            score: Some(40),
            passed: Some(false),
            started_at,
            submitted_at: None,
            duration_seconds: None,
            created_at: started_at,
        }
    }

    #[test]
    fn flags_attempts_closer_than_the_threshold() {
        // Newest first: second attempt started 60s after the first.
        let attempts = vec![attempt(2, 60), attempt(1, 0)];
        assert!(rapid_retry(&attempts, 300));
    }

    #[test]
    fn leaves_spaced_attempts_alone() {
        let attempts = vec![attempt(3, 1200), attempt(2, 600), attempt(1, 0)];
        assert!(!rapid_retry(&attempts, 300));
    }

    #[test]
    fn a_single_attempt_is_never_rapid() {
        assert!(!rapid_retry(&[attempt(1, 0)], 300));
        assert!(!rapid_retry(&[], 300));
    }

    #[test]
    fn any_consecutive_pair_in_the_window_counts() {
        // The gap is between the two oldest attempts in the window.
        let attempts = vec![attempt(3, 1000), attempt(2, 400), attempt(1, 300)];
        assert!(rapid_retry(&attempts, 300));
    }
}
