// src/lib.rs

pub mod blob;
pub mod config;
pub mod error;
pub mod lock;
pub mod models;
pub mod notify;
pub mod services;
pub mod store;
pub mod utils;

// Re-export the main entry points for convenience.
pub use error::ExamError;
pub use services::certificate::{CertificateIssuer, CertificatePipeline};
pub use services::session::ExamSessionManager;
