// src/services/training.rs

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    error::EngineError,
    models::training::{ModuleDescriptor, TrainingModule, TrainingProgress},
    services::prerequisites,
};

/// Starts (or restarts) a training module for a user.
///
/// The module must exist and be active, and every direct prerequisite must be
/// completed. The progress row is created on first start and updated in place
/// thereafter; restarting a completed module resets it to in-progress with a
/// refreshed start timestamp.
pub async fn start(
    pool: &SqlitePool,
    user_id: &str,
    module_id: i64,
) -> Result<ModuleDescriptor, EngineError> {
    let module = sqlx::query_as::<_, TrainingModule>(
        r#"
        SELECT id, title, content, active, prerequisites, created_at
        FROM modules
        WHERE id = ?
        "#,
    )
    .bind(module_id)
    .fetch_optional(pool)
    .await?
    .filter(|m| m.active)
    .ok_or_else(|| EngineError::NotFound(format!("Module {} not found", module_id)))?;

    let check = prerequisites::can_start(pool, user_id, module_id).await?;
    if !check.allowed {
        return Err(EngineError::PrerequisitesNotMet(check.blocked_by));
    }

    sqlx::query(
        r#"
        INSERT INTO training_progress
            (user_id, module_id, status, percentage, time_spent_seconds, started_at)
        VALUES (?, ?, 'in_progress', 0, 0, ?)
        ON CONFLICT(user_id, module_id) DO UPDATE SET
            status = 'in_progress',
            started_at = excluded.started_at,
            completed_at = NULL
        "#,
    )
    .bind(user_id)
    .bind(module_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(ModuleDescriptor {
        id: module.id,
        title: module.title,
        content: module.content,
    })
}

/// Overwrites the completion percentage and accumulates time spent.
/// Does not change status.
pub async fn update_progress(
    pool: &SqlitePool,
    user_id: &str,
    module_id: i64,
    percentage: i64,
    time_spent_delta: i64,
) -> Result<(), EngineError> {
    let result = sqlx::query(
        r#"
        UPDATE training_progress
        SET percentage = ?, time_spent_seconds = time_spent_seconds + ?
        WHERE user_id = ? AND module_id = ?
        "#,
    )
    .bind(percentage)
    .bind(time_spent_delta)
    .bind(user_id)
    .bind(module_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::NotFound(format!(
            "No progress for user {} on module {}",
            user_id, module_id
        )));
    }

    Ok(())
}

/// Marks the module completed for the user. Idempotent: a second call just
/// overwrites the fields again. This is the event downstream prerequisite
/// checks consult.
pub async fn complete(
    pool: &SqlitePool,
    user_id: &str,
    module_id: i64,
    final_percentage: Option<i64>,
    total_time_spent: Option<i64>,
) -> Result<(), EngineError> {
    let result = sqlx::query(
        r#"
        UPDATE training_progress
        SET status = 'completed',
            percentage = ?,
            completed_at = ?,
            time_spent_seconds = COALESCE(?, time_spent_seconds)
        WHERE user_id = ? AND module_id = ?
        "#,
    )
    .bind(final_percentage.unwrap_or(100))
    .bind(Utc::now())
    .bind(total_time_spent)
    .bind(user_id)
    .bind(module_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::NotFound(format!(
            "No progress for user {} on module {}",
            user_id, module_id
        )));
    }

    Ok(())
}

/// Reads the user's progress row for a module, if any.
pub async fn get_progress(
    pool: &SqlitePool,
    user_id: &str,
    module_id: i64,
) -> Result<Option<TrainingProgress>, EngineError> {
    let progress = sqlx::query_as::<_, TrainingProgress>(
        r#"
        SELECT id, user_id, module_id, status, percentage, time_spent_seconds,
               started_at, completed_at
        FROM training_progress
        WHERE user_id = ? AND module_id = ?
        "#,
    )
    .bind(user_id)
    .bind(module_id)
    .fetch_optional(pool)
    .await?;

    Ok(progress)
}
