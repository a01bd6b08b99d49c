// src/models/assessment.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Whether an assessment is a scored quiz or a client-side mini-game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    Quiz,
    Game,
}

/// Question kind. Multi-select questions may flag several options correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Single,
    TrueFalse,
    Multi,
}

/// Represents the 'assessments' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Assessment {
    pub id: i64,
    pub kind: AssessmentKind,
    pub title: String,

    /// Deactivation is logical once attempts reference the row.
    pub active: bool,

    /// Minimum total score to pass. Quizzes only.
    pub pass_threshold: Option<i64>,

    /// Raw configuration payload returned to game clients on start.
    pub game_config: Option<Json<serde_json::Value>>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One selectable option of a question. Stored as a JSON array in the
/// question row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub text: String,
    pub correct: bool,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub assessment_id: i64,
    pub position: i64,
    pub kind: QuestionKind,
    pub content: String,
    pub points: i64,
    pub options: Json<Vec<AnswerOption>>,
}

/// DTO for sending a question to the client (excludes correctness flags).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub kind: QuestionKind,
    pub content: String,
    pub points: i64,
    pub options: Vec<String>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            kind: q.kind,
            content: q.content,
            points: q.points,
            options: q.options.0.into_iter().map(|o| o.text).collect(),
        }
    }
}

/// DTO for creating a new assessment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssessmentRequest {
    pub kind: AssessmentKind,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub pass_threshold: Option<i64>,
    pub game_config: Option<serde_json::Value>,
}

/// DTO for updating an assessment. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateAssessmentRequest {
    pub title: Option<String>,
    pub active: Option<bool>,
    pub pass_threshold: Option<i64>,
    pub game_config: Option<serde_json::Value>,
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub kind: QuestionKind,
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
    #[validate(range(min = 1))]
    pub points: i64,
    #[validate(custom(function = validate_options))]
    pub options: Vec<AnswerOption>,
    pub position: Option<i64>,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub kind: Option<QuestionKind>,
    pub content: Option<String>,
    pub points: Option<i64>,
    pub options: Option<Vec<AnswerOption>>,
    pub position: Option<i64>,
}

fn validate_options(options: &[AnswerOption]) -> Result<(), validator::ValidationError> {
    if options.is_empty() {
        return Err(validator::ValidationError::new("options_cannot_be_empty"));
    }
    for opt in options {
        if opt.text.is_empty() || opt.text.len() > 500 {
            return Err(validator::ValidationError::new("option_text_length"));
        }
    }
    if !options.iter().any(|o| o.correct) {
        return Err(validator::ValidationError::new("no_correct_option"));
    }
    Ok(())
}
