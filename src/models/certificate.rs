// src/models/certificate.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted proof that a learner passed a course exam.
///
/// At most one per (user, course), enforced by an existence check inside
/// the transaction that finalizes the attempt's score. `pdf_url` stays
/// null until the background pipeline has rendered and uploaded the
/// document.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Certificate {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub exam_attempt_id: i64,
    pub certificate_number: String,
    pub pdf_url: Option<String>,
    pub is_valid: bool,
    pub issued_at: DateTime<Utc>,
}

impl Certificate {
    pub fn summary(&self) -> CertificateSummary {
        CertificateSummary {
            id: self.id,
            certificate_number: self.certificate_number.clone(),
            pdf_url: self.pdf_url.clone(),
            issued_at: self.issued_at,
        }
    }
}

/// What the learner-facing surfaces expose about a certificate.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateSummary {
    pub id: i64,
    pub certificate_number: String,
    pub pdf_url: Option<String>,
    pub issued_at: DateTime<Utc>,
}

/// Outcome of the public verification lookup.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateVerification {
    pub valid: bool,
    pub recipient: Option<String>,
    pub course_title: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
}

impl CertificateVerification {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            recipient: None,
            course_title: None,
            issued_at: None,
        }
    }
}
