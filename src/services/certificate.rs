// src/services/certificate.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::blob::BlobStorage;
use crate::config::ExamConfig;
use crate::error::ExamError;
use crate::models::certificate::{Certificate, CertificateVerification};
use crate::notify::Notifier;
use crate::store::ExamStore;
use crate::utils::{certnum, pdf};

/// Renders, uploads and announces certificates. The heavy work runs in
/// the background pipeline after the submit transaction has committed;
/// everything here is safe to retry because `generate` is idempotent on
/// `pdf_url`.
pub struct CertificateIssuer {
    store: Arc<dyn ExamStore>,
    blob: Arc<dyn BlobStorage>,
    notifier: Arc<dyn Notifier>,
    config: ExamConfig,
}

impl CertificateIssuer {
    pub fn new(
        store: Arc<dyn ExamStore>,
        blob: Arc<dyn BlobStorage>,
        notifier: Arc<dyn Notifier>,
        config: ExamConfig,
    ) -> Self {
        Self {
            store,
            blob,
            notifier,
            config,
        }
    }

    /// Derives the certificate number recorded in the finalization
    /// transaction. A readable identifier, not a security token.
    pub fn certificate_number(
        user_id: i64,
        course_id: i64,
        attempt_id: i64,
        issued_at: DateTime<Utc>,
    ) -> String {
        certnum::certificate_number(user_id, course_id, attempt_id, issued_at)
    }

    /// Renders the certificate document, uploads it and emails the
    /// learner. Invoked once per created certificate row; at-least-once
    /// delivery is fine: a row whose `pdf_url` is already set is left
    /// untouched. Email failure is logged, never fatal: the certificate
    /// stays valid and retrievable without it.
    pub async fn generate(&self, certificate_id: i64) -> Result<(), ExamError> {
        let certificate = self
            .store
            .find_certificate_by_id(certificate_id)
            .await?
            .ok_or_else(|| {
                ExamError::NotFound(format!("certificate {} not found", certificate_id))
            })?;

        if certificate.pdf_url.is_some() {
            return Ok(());
        }

        let learner = self
            .store
            .find_learner(certificate.user_id)
            .await?
            .ok_or_else(|| ExamError::NotFound("certificate recipient not found".to_string()))?;
        let course = self
            .store
            .find_course(certificate.course_id)
            .await?
            .ok_or_else(|| ExamError::NotFound("certified course not found".to_string()))?;

        let verification_url = self.verification_url(&certificate);
        let document = pdf::CertificateDocument {
            recipient: learner.name.clone(),
            course_title: course.title.clone(),
            certificate_number: certificate.certificate_number.clone(),
            issued_on: certificate.issued_at.format("%B %-d, %Y").to_string(),
            verification_url: verification_url.clone(),
        };
        let bytes = pdf::render(&document);

        let path = format!(
            "{}/certificate_{}_{}.pdf",
            self.config.certificate_folder, certificate.id, certificate.certificate_number
        );
        let pdf_url = self.blob.upload(bytes, &path, "application/pdf").await?;
        self.store
            .set_certificate_pdf_url(certificate.id, &pdf_url)
            .await?;

        tracing::info!(
            "Certificate {} rendered and uploaded to {}",
            certificate.certificate_number,
            pdf_url
        );

        let subject = format!("Your certificate for {}", course.title);
        let body = completion_email(&learner.name, &course.title, &pdf_url, &verification_url);
        if let Err(e) = self.notifier.send(&learner.email, &subject, &body).await {
            tracing::warn!(
                "Failed to send certificate email to {}: {}",
                learner.email,
                e
            );
        }

        Ok(())
    }

    /// Read-only lookup; safe to call concurrently with `generate`.
    pub async fn find_existing(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Option<Certificate>, ExamError> {
        self.store.find_certificate(user_id, course_id).await
    }

    /// The public verification lookup behind the URL printed on every
    /// certificate.
    pub async fn verify(
        &self,
        certificate_number: &str,
    ) -> Result<CertificateVerification, ExamError> {
        let Some(certificate) = self
            .store
            .find_certificate_by_number(certificate_number)
            .await?
        else {
            return Ok(CertificateVerification::invalid());
        };
        if !certificate.is_valid {
            return Ok(CertificateVerification::invalid());
        }

        let learner = self.store.find_learner(certificate.user_id).await?;
        let course = self.store.find_course(certificate.course_id).await?;
        Ok(CertificateVerification {
            valid: true,
            recipient: learner.map(|l| l.name),
            course_title: course.map(|c| c.title),
            issued_at: Some(certificate.issued_at),
        })
    }

    fn verification_url(&self, certificate: &Certificate) -> String {
        format!(
            "{}/{}",
            self.config.verification_base_url.trim_end_matches('/'),
            certificate.certificate_number
        )
    }
}

fn completion_email(name: &str, course_title: &str, pdf_url: &str, verification_url: &str) -> String {
    format!(
        "<p>Congratulations {}!</p>\
         <p>You have passed the exam for <strong>{}</strong>.</p>\
         <p>Your certificate is ready: <a href=\"{}\">download it here</a>.</p>\
         <p>Anyone can verify it at <a href=\"{}\">{}</a>.</p>",
        name, course_title, pdf_url, verification_url, verification_url
    )
}

/// Handle for scheduling certificate issuance after commit.
///
/// Jobs go onto an unbounded channel drained by a dedicated worker
/// task, so the submit path never waits on rendering, upload or mail.
/// The worker retries a failed job a configured number of times and
/// then gives up with an error log; a pipeline outage is never
/// reported as exam failure.
#[derive(Clone)]
pub struct CertificatePipeline {
    tx: mpsc::UnboundedSender<CertificateJob>,
}

#[derive(Debug)]
struct CertificateJob {
    certificate_id: i64,
}

impl CertificatePipeline {
    /// Spawns the worker task. Must be called within a Tokio runtime.
    pub fn spawn(issuer: Arc<CertificateIssuer>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<CertificateJob>();
        let attempts = issuer.config.certificate_retry_attempts.max(1);
        let delay = std::time::Duration::from_millis(issuer.config.certificate_retry_delay_ms);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                for attempt in 1..=attempts {
                    match issuer.generate(job.certificate_id).await {
                        Ok(()) => break,
                        Err(e) if attempt < attempts => {
                            tracing::warn!(
                                "Certificate {} generation failed (attempt {}/{}): {}",
                                job.certificate_id,
                                attempt,
                                attempts,
                                e
                            );
                            tokio::time::sleep(delay).await;
                        }
                        Err(e) => {
                            tracing::error!(
                                "Giving up on certificate {} after {} attempts: {}",
                                job.certificate_id,
                                attempts,
                                e
                            );
                        }
                    }
                }
            }
        });

        Self { tx }
    }

    /// Enqueues issuance for a freshly created certificate row.
    pub fn enqueue(&self, certificate_id: i64) {
        if self
            .tx
            .send(CertificateJob { certificate_id })
            .is_err()
        {
            tracing::error!(
                "Certificate pipeline is down; certificate {} left without a document",
                certificate_id
            );
        }
    }
}
