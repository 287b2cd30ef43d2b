// src/models/mod.rs

pub mod attempt;
pub mod certificate;
pub mod course;
pub mod question;
pub mod user;
