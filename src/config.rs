// src/config.rs

use std::env;

use dotenvy::dotenv;

/// Engine configuration, read from the environment with code defaults.
///
/// The defaults match the platform's exam constants (30 minute exams,
/// 60% pass score, 5 minute retry threshold).
#[derive(Debug, Clone)]
pub struct ExamConfig {
    /// Extra seconds added to the session entry's TTL beyond the exam
    /// duration, so a submission racing the deadline still finds its
    /// session token.
    pub session_grace_secs: u64,

    /// TTL of the guard key that closes the check-then-set race
    /// between two concurrent start() calls.
    pub start_guard_ttl_secs: u64,

    /// How many recent attempts the monitor inspects.
    pub monitor_window: usize,

    /// Two attempts started closer together than this are suspicious.
    pub monitor_threshold_secs: i64,

    /// TTL of the audit marker written when an attempt is flagged.
    pub flag_marker_ttl_secs: u64,

    /// Retry budget of the certificate pipeline worker.
    pub certificate_retry_attempts: u32,

    /// Delay between pipeline retries, in milliseconds.
    pub certificate_retry_delay_ms: u64,

    /// Base URL embedded in certificates; the public verification
    /// endpoint is `{base}/{certificate_number}`.
    pub verification_base_url: String,

    /// Blob-storage folder that receives rendered certificates.
    pub certificate_folder: String,
}

impl ExamConfig {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            session_grace_secs: read_var("EXAM_SESSION_GRACE_SECS", 300),
            start_guard_ttl_secs: read_var("EXAM_START_GUARD_TTL_SECS", 300),
            monitor_window: read_var("EXAM_MONITOR_WINDOW", 5),
            monitor_threshold_secs: read_var("EXAM_MONITOR_THRESHOLD_SECS", 300),
            flag_marker_ttl_secs: read_var("EXAM_FLAG_MARKER_TTL_SECS", 86_400),
            certificate_retry_attempts: read_var("CERTIFICATE_RETRY_ATTEMPTS", 3),
            certificate_retry_delay_ms: read_var("CERTIFICATE_RETRY_DELAY_MS", 500),
            verification_base_url: env::var("CERTIFICATE_VERIFICATION_BASE_URL")
                .unwrap_or_else(|_| "https://learn.example.com/certificates/verify".to_string()),
            certificate_folder: env::var("CERTIFICATE_FOLDER")
                .unwrap_or_else(|_| "certificates".to_string()),
        }
    }
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            session_grace_secs: 300,
            start_guard_ttl_secs: 300,
            monitor_window: 5,
            monitor_threshold_secs: 300,
            flag_marker_ttl_secs: 86_400,
            certificate_retry_attempts: 3,
            certificate_retry_delay_ms: 500,
            verification_base_url: "https://learn.example.com/certificates/verify".to_string(),
            certificate_folder: "certificates".to_string(),
        }
    }
}

fn read_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
