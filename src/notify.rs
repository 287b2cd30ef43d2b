// src/notify.rs

use async_trait::async_trait;

use crate::error::ExamError;

/// Outbound mail. Failures here are never fatal to the exam flow: a
/// certificate remains valid and retrievable without the email.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &str, subject: &str, html_body: &str) -> Result<(), ExamError>;
}

/// Development notifier: logs the message instead of delivering it.
#[derive(Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, email: &str, subject: &str, _html_body: &str) -> Result<(), ExamError> {
        tracing::info!("Sending email to {}: {}", email, subject);
        Ok(())
    }
}
