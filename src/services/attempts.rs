// src/services/attempts.rs

use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::types::Json;

use crate::{
    error::EngineError,
    models::{
        assessment::{AnswerOption, Assessment, AssessmentKind, PublicQuestion, Question},
        attempt::{
            Attempt, AttemptHistory, AttemptOutcome, AttemptStatus, CompletedAttempt,
            StartedAttempt, SubmitAttemptRequest,
        },
    },
    services::scoring::{self, AnswerKey},
};

/// Helper struct for fetching answer keys from the database.
#[derive(sqlx::FromRow)]
struct AnswerKeyRow {
    id: i64,
    points: i64,
    options: Json<Vec<AnswerOption>>,
}

async fn fetch_assessment(
    pool: &SqlitePool,
    assessment_id: i64,
) -> Result<Option<Assessment>, EngineError> {
    let assessment = sqlx::query_as::<_, Assessment>(
        r#"
        SELECT id, kind, title, active, pass_threshold, game_config, created_at
        FROM assessments
        WHERE id = ?
        "#,
    )
    .bind(assessment_id)
    .fetch_optional(pool)
    .await?;

    Ok(assessment)
}

/// Starts a new attempt for (user, assessment).
///
/// Any stale open attempt for the pair is marked abandoned first; the partial
/// unique index on open attempts guarantees at most one open row even when
/// two starts race, in which case the loser gets `Conflict` and retries.
/// For games the raw configuration payload is returned so the client can
/// render without a second round trip.
pub async fn start(
    pool: &SqlitePool,
    user_id: &str,
    assessment_id: i64,
) -> Result<StartedAttempt, EngineError> {
    let assessment = fetch_assessment(pool, assessment_id)
        .await?
        .filter(|a| a.active)
        .ok_or_else(|| {
            EngineError::NotFound(format!("Assessment {} not found", assessment_id))
        })?;

    let abandoned = sqlx::query(
        r#"
        UPDATE attempts SET status = 'abandoned'
        WHERE user_id = ? AND assessment_id = ? AND status = 'open'
        "#,
    )
    .bind(user_id)
    .bind(assessment_id)
    .execute(pool)
    .await?;

    if abandoned.rows_affected() > 0 {
        tracing::info!(
            "Abandoned {} stale open attempt(s) for user {} on assessment {}",
            abandoned.rows_affected(),
            user_id,
            assessment_id
        );
    }

    let started_at = Utc::now();
    let attempt_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO attempts (user_id, assessment_id, status, started_at)
        VALUES (?, ?, 'open', ?)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(assessment_id)
    .bind(started_at)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if e.as_database_error()
            .is_some_and(|db| db.is_unique_violation())
        {
            // Lost a concurrent-start race for the same pair.
            EngineError::Conflict("An attempt was started concurrently".to_string())
        } else {
            tracing::error!("Failed to insert attempt: {:?}", e);
            EngineError::Database(e.to_string())
        }
    })?;

    let game_config = match assessment.kind {
        AssessmentKind::Game => assessment.game_config.map(|c| c.0),
        AssessmentKind::Quiz => None,
    };

    Ok(StartedAttempt {
        attempt_id,
        started_at,
        game_config,
    })
}

/// Returns an active quiz's questions with correctness flags stripped, for
/// client rendering alongside `start`.
pub async fn get_paper(
    pool: &SqlitePool,
    assessment_id: i64,
) -> Result<Vec<PublicQuestion>, EngineError> {
    let assessment = fetch_assessment(pool, assessment_id)
        .await?
        .filter(|a| a.active && a.kind == AssessmentKind::Quiz)
        .ok_or_else(|| EngineError::NotFound(format!("Quiz {} not found", assessment_id)))?;

    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, assessment_id, position, kind, content, points, options
        FROM questions
        WHERE assessment_id = ?
        ORDER BY position, id
        "#,
    )
    .bind(assessment.id)
    .fetch_all(pool)
    .await?;

    Ok(questions.into_iter().map(PublicQuestion::from).collect())
}

/// Submits an open attempt and freezes its result.
///
/// Quizzes are scored server-side from the stored answer keys; games are
/// client-side simulations, so the caller-declared score and result blob are
/// accepted as-is and tagged self-reported in the outcome.
pub async fn submit(
    pool: &SqlitePool,
    user_id: &str,
    assessment_id: i64,
    attempt_id: i64,
    req: SubmitAttemptRequest,
) -> Result<AttemptOutcome, EngineError> {
    let assessment = fetch_assessment(pool, assessment_id)
        .await?
        .ok_or_else(|| {
            EngineError::NotFound(format!("Assessment {} not found", assessment_id))
        })?;

    let attempt = sqlx::query_as::<_, Attempt>(
        r#"
        SELECT id, user_id, assessment_id, status, started_at, completed_at,
               score, max_score, passed, elapsed_seconds, answers
        FROM attempts
        WHERE id = ?
        "#,
    )
    .bind(attempt_id)
    .fetch_optional(pool)
    .await?;

    let _attempt = attempt
        .filter(|a| {
            a.user_id == user_id
                && a.assessment_id == assessment_id
                && a.status == AttemptStatus::Open
        })
        .ok_or_else(|| {
            EngineError::InvalidAttempt(format!(
                "Attempt {} is not an open attempt of user {} on assessment {}",
                attempt_id, user_id, assessment_id
            ))
        })?;

    let (score, max_score, percentage, passed, answers_payload) = match assessment.kind {
        AssessmentKind::Quiz => {
            // Batched answer-key fetch: all keys are resolved before the
            // single terminal write below, and nothing is persisted on error.
            let rows = sqlx::query_as::<_, AnswerKeyRow>(
                r#"
                SELECT id, points, options
                FROM questions
                WHERE assessment_id = ?
                ORDER BY position, id
                "#,
            )
            .bind(assessment_id)
            .fetch_all(pool)
            .await?;

            let keys: Vec<AnswerKey> = rows
                .into_iter()
                .map(|row| AnswerKey {
                    unit_id: row.id,
                    points: row.points,
                    correct: row
                        .options
                        .0
                        .into_iter()
                        .filter(|o| o.correct)
                        .map(|o| o.text)
                        .collect(),
                })
                .collect();

            let outcome = scoring::evaluate(&keys, &req.answers);
            let passed = outcome.score >= assessment.pass_threshold.unwrap_or(0);

            (
                outcome.score,
                Some(outcome.max_score),
                Some(outcome.percentage),
                Some(passed),
                Some(serde_json::to_value(&req.answers)?),
            )
        }
        AssessmentKind::Game => {
            // Self-reported: no server-verifiable ground truth exists.
            (req.score.unwrap_or(0), None, None, None, req.result.clone())
        }
    };

    let completed_at = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE attempts
        SET status = 'completed', completed_at = ?, score = ?, max_score = ?,
            passed = ?, elapsed_seconds = ?, answers = ?
        WHERE id = ? AND status = 'open'
        "#,
    )
    .bind(completed_at)
    .bind(score)
    .bind(max_score)
    .bind(passed)
    .bind(req.elapsed_seconds)
    .bind(answers_payload.map(Json))
    .bind(attempt_id)
    .execute(pool)
    .await?;

    // A concurrent submit or restart closed the row between the read above
    // and this write.
    if result.rows_affected() == 0 {
        return Err(EngineError::InvalidAttempt(format!(
            "Attempt {} was closed concurrently",
            attempt_id
        )));
    }

    Ok(AttemptOutcome {
        score,
        max_score,
        percentage,
        passed,
        elapsed_seconds: req.elapsed_seconds,
        self_reported: assessment.kind == AssessmentKind::Game,
    })
}

/// Lists all closed attempts for (user, assessment), most recent first, with
/// the best score and, for games, the best elapsed time.
pub async fn get_results(
    pool: &SqlitePool,
    user_id: &str,
    assessment_id: i64,
) -> Result<AttemptHistory, EngineError> {
    let assessment = fetch_assessment(pool, assessment_id)
        .await?
        .ok_or_else(|| {
            EngineError::NotFound(format!("Assessment {} not found", assessment_id))
        })?;

    let attempts = sqlx::query_as::<_, CompletedAttempt>(
        r#"
        SELECT id, score, max_score, passed, elapsed_seconds, completed_at
        FROM attempts
        WHERE user_id = ? AND assessment_id = ? AND status = 'completed'
        ORDER BY completed_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .bind(assessment_id)
    .fetch_all(pool)
    .await?;

    if attempts.is_empty() {
        return Err(EngineError::NotFound(format!(
            "No completed attempts for user {} on assessment {}",
            user_id, assessment_id
        )));
    }

    let best_score = attempts.iter().filter_map(|a| a.score).max();
    let best_elapsed_seconds = match assessment.kind {
        AssessmentKind::Game => attempts.iter().filter_map(|a| a.elapsed_seconds).min(),
        AssessmentKind::Quiz => None,
    };

    Ok(AttemptHistory {
        attempts,
        best_score,
        best_elapsed_seconds,
        self_reported: assessment.kind == AssessmentKind::Game,
    })
}
