// src/utils/mod.rs

pub mod certnum;
pub mod pdf;
