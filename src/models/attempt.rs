// src/models/attempt.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// Attempt lifecycle state. `open` transitions once, irreversibly, to
/// `completed` on submit. A restart marks the stale open row `abandoned`
/// instead of deleting it, keeping the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Open,
    Completed,
    Abandoned,
}

/// Represents the 'attempts' table in the database.
/// One row per timed instance of a user working through an assessment.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub user_id: String,
    pub assessment_id: i64,
    pub status: AttemptStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub score: Option<i64>,
    pub max_score: Option<i64>,
    pub passed: Option<bool>,
    pub elapsed_seconds: Option<i64>,
    pub answers: Option<Json<serde_json::Value>>,
}

/// A user's submitted answer for one question: either a single option or a
/// collection of options (multi-select).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmittedAnswer {
    One(String),
    Many(Vec<String>),
}

/// DTO for submitting an attempt.
///
/// Quizzes fill `answers`; games report their own `score` and `result` blob
/// since the simulation runs entirely client-side.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitAttemptRequest {
    /// Map from question id to the user's chosen option(s).
    #[serde(default)]
    pub answers: HashMap<i64, SubmittedAnswer>,

    /// Client-reported score. Games only; ignored for quizzes.
    pub score: Option<i64>,

    /// Client-reported result payload. Games only.
    pub result: Option<serde_json::Value>,

    pub elapsed_seconds: Option<i64>,
}

/// DTO returned by a successful start.
#[derive(Debug, Serialize)]
pub struct StartedAttempt {
    pub attempt_id: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// Game configuration payload, so the client can render the game without
    /// a second round trip. `None` for quizzes.
    pub game_config: Option<serde_json::Value>,
}

/// DTO returned by a successful submit.
#[derive(Debug, Serialize)]
pub struct AttemptOutcome {
    pub score: i64,
    pub max_score: Option<i64>,
    pub percentage: Option<i64>,
    pub passed: Option<bool>,
    pub elapsed_seconds: Option<i64>,

    /// True for game attempts: the score came from the client, not from
    /// server-side evaluation.
    pub self_reported: bool,
}

/// One closed attempt as listed in results.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CompletedAttempt {
    pub id: i64,
    pub score: Option<i64>,
    pub max_score: Option<i64>,
    pub passed: Option<bool>,
    pub elapsed_seconds: Option<i64>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for the results listing: all closed attempts, most recent first.
#[derive(Debug, Serialize)]
pub struct AttemptHistory {
    pub attempts: Vec<CompletedAttempt>,
    pub best_score: Option<i64>,

    /// Fastest completion. Games only.
    pub best_elapsed_seconds: Option<i64>,

    pub self_reported: bool,
}
