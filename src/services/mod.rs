// src/services/mod.rs

pub mod attempts;
pub mod content;
pub mod prerequisites;
pub mod scoring;
pub mod training;
