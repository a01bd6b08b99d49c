// src/lib.rs

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;

// Re-export specific items for convenience if needed
pub use error::EngineError;
