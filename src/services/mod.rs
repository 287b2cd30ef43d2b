// src/services/mod.rs

pub mod certificate;
pub mod monitoring;
pub mod scoring;
pub mod session;
