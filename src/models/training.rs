// src/models/training.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Progress status for one (user, module) pair. `not_started` is the absence
/// of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    InProgress,
    Completed,
}

/// Represents the 'modules' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrainingModule {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub active: bool,

    /// Raw prerequisite declaration as stored: a JSON array of module ids.
    /// Kept raw so the resolver can fail open on a malformed legacy blob.
    pub prerequisites: String,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'training_progress' table in the database.
/// At most one row per (user, module); mutated in place, never replaced.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrainingProgress {
    pub id: i64,
    pub user_id: String,
    pub module_id: i64,
    pub status: ProgressStatus,
    pub percentage: i64,
    pub time_spent_seconds: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO handed to the client when a module start is allowed.
#[derive(Debug, Serialize)]
pub struct ModuleDescriptor {
    pub id: i64,
    pub title: String,
    pub content: String,
}

/// Outcome of a prerequisite check.
#[derive(Debug, Serialize)]
pub struct PrereqCheck {
    pub allowed: bool,

    /// Direct prerequisites the user has not completed, in declared order.
    pub blocked_by: Vec<i64>,
}

/// DTO for creating a new training module.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateModuleRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 20000))]
    pub content: String,
    #[serde(default)]
    pub prerequisites: Vec<i64>,
}

/// DTO for updating a module. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateModuleRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub active: Option<bool>,
    pub prerequisites: Option<Vec<i64>>,
}
