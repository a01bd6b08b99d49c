// src/services/content.rs

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json};
use validator::Validate;

use crate::{
    error::EngineError,
    models::{
        assessment::{
            AnswerOption, AssessmentKind, CreateAssessmentRequest, CreateQuestionRequest,
            Question, QuestionKind, UpdateAssessmentRequest, UpdateQuestionRequest,
        },
        training::{CreateModuleRequest, UpdateModuleRequest},
    },
    services::prerequisites::parse_prerequisites,
};

/// Capability check against the external identity/role collaborator.
#[async_trait]
pub trait RoleProvider: Send + Sync {
    async fn can_administer(&self, user_id: &str) -> Result<bool, EngineError>;
}

async fn ensure_admin(roles: &dyn RoleProvider, user_id: &str) -> Result<(), EngineError> {
    if roles.can_administer(user_id).await? {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!(
            "User {} may not administer content",
            user_id
        )))
    }
}

/// Option-set rules that depend on the question kind, checked after the
/// field-level validators.
fn validate_option_set(kind: QuestionKind, options: &[AnswerOption]) -> Result<(), EngineError> {
    let correct_count = options.iter().filter(|o| o.correct).count();

    match kind {
        QuestionKind::Single => {
            if correct_count != 1 {
                return Err(EngineError::MalformedInput(
                    "Single-choice questions need exactly one correct option".to_string(),
                ));
            }
        }
        QuestionKind::TrueFalse => {
            if options.len() != 2 || correct_count != 1 {
                return Err(EngineError::MalformedInput(
                    "True/false questions need exactly two options, one correct".to_string(),
                ));
            }
        }
        QuestionKind::Multi => {
            if correct_count == 0 {
                return Err(EngineError::MalformedInput(
                    "Multi-select questions need at least one correct option".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Creates a new assessment. Admin only.
pub async fn create_assessment(
    pool: &SqlitePool,
    roles: &dyn RoleProvider,
    user_id: &str,
    payload: CreateAssessmentRequest,
) -> Result<i64, EngineError> {
    ensure_admin(roles, user_id).await?;
    payload.validate()?;

    match payload.kind {
        AssessmentKind::Quiz => {
            if payload.pass_threshold.is_none() {
                return Err(EngineError::MalformedInput(
                    "Quizzes require a pass threshold".to_string(),
                ));
            }
        }
        AssessmentKind::Game => {
            if payload.pass_threshold.is_some() {
                return Err(EngineError::MalformedInput(
                    "Games have no pass threshold".to_string(),
                ));
            }
        }
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO assessments (kind, title, active, pass_threshold, game_config, created_at)
        VALUES (?, ?, 1, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(payload.kind)
    .bind(payload.title)
    .bind(payload.pass_threshold)
    .bind(payload.game_config.map(Json))
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create assessment: {:?}", e);
        EngineError::Database(e.to_string())
    })?;

    Ok(id)
}

/// Updates an assessment by id. Admin only.
/// Deactivation goes through here (`active = false`) once attempts exist.
pub async fn update_assessment(
    pool: &SqlitePool,
    roles: &dyn RoleProvider,
    user_id: &str,
    assessment_id: i64,
    payload: UpdateAssessmentRequest,
) -> Result<(), EngineError> {
    ensure_admin(roles, user_id).await?;

    if payload.title.is_none()
        && payload.active.is_none()
        && payload.pass_threshold.is_none()
        && payload.game_config.is_none()
    {
        return Ok(());
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE assessments SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(active) = payload.active {
        separated.push("active = ");
        separated.push_bind_unseparated(active);
    }

    if let Some(pass_threshold) = payload.pass_threshold {
        separated.push("pass_threshold = ");
        separated.push_bind_unseparated(pass_threshold);
    }

    if let Some(game_config) = payload.game_config {
        separated.push("game_config = ");
        separated.push_bind_unseparated(Json(game_config));
    }

    builder.push(" WHERE id = ");
    builder.push_bind(assessment_id);

    let result = builder.build().execute(pool).await.map_err(|e| {
        tracing::error!("Failed to update assessment: {:?}", e);
        EngineError::Database(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(EngineError::NotFound("Assessment not found".to_string()));
    }

    Ok(())
}

/// Hard-deletes an assessment and its questions. Admin only.
/// Permitted only while zero attempts reference it; otherwise the caller
/// should deactivate instead.
pub async fn delete_assessment(
    pool: &SqlitePool,
    roles: &dyn RoleProvider,
    user_id: &str,
    assessment_id: i64,
) -> Result<(), EngineError> {
    ensure_admin(roles, user_id).await?;

    let attempt_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM attempts WHERE assessment_id = ?")
            .bind(assessment_id)
            .fetch_one(pool)
            .await?;

    if attempt_count > 0 {
        return Err(EngineError::Conflict(format!(
            "Assessment {} has {} recorded attempt(s); deactivate it instead",
            assessment_id, attempt_count
        )));
    }

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM questions WHERE assessment_id = ?")
        .bind(assessment_id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM assessments WHERE id = ?")
        .bind(assessment_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::NotFound("Assessment not found".to_string()));
    }

    tx.commit().await?;

    Ok(())
}

/// Creates a new question under a quiz. Admin only.
pub async fn create_question(
    pool: &SqlitePool,
    roles: &dyn RoleProvider,
    user_id: &str,
    assessment_id: i64,
    payload: CreateQuestionRequest,
) -> Result<i64, EngineError> {
    ensure_admin(roles, user_id).await?;
    payload.validate()?;
    validate_option_set(payload.kind, &payload.options)?;

    let kind: Option<AssessmentKind> =
        sqlx::query_scalar("SELECT kind FROM assessments WHERE id = ?")
            .bind(assessment_id)
            .fetch_optional(pool)
            .await?;

    match kind {
        None => return Err(EngineError::NotFound("Assessment not found".to_string())),
        Some(AssessmentKind::Game) => {
            return Err(EngineError::Conflict(
                "Games have no scoring units".to_string(),
            ));
        }
        Some(AssessmentKind::Quiz) => {}
    }

    let position = match payload.position {
        Some(p) => p,
        None => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM questions WHERE assessment_id = ?",
            )
            .bind(assessment_id)
            .fetch_one(pool)
            .await?
        }
    };

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (assessment_id, position, kind, content, points, options)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(assessment_id)
    .bind(position)
    .bind(payload.kind)
    .bind(payload.content)
    .bind(payload.points)
    .bind(Json(payload.options))
    .fetch_one(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        EngineError::Database(e.to_string())
    })?;

    Ok(id)
}

/// Updates a question by id. Admin only.
/// The merged row is re-validated so a kind change cannot bypass the
/// option-set rules.
pub async fn update_question(
    pool: &SqlitePool,
    roles: &dyn RoleProvider,
    user_id: &str,
    question_id: i64,
    payload: UpdateQuestionRequest,
) -> Result<(), EngineError> {
    ensure_admin(roles, user_id).await?;

    let existing = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, assessment_id, position, kind, content, points, options
        FROM questions
        WHERE id = ?
        "#,
    )
    .bind(question_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| EngineError::NotFound("Question not found".to_string()))?;

    let kind = payload.kind.unwrap_or(existing.kind);
    let content = payload.content.unwrap_or(existing.content);
    let points = payload.points.unwrap_or(existing.points);
    let options = payload.options.unwrap_or(existing.options.0);
    let position = payload.position.unwrap_or(existing.position);

    if content.is_empty() || points < 1 {
        return Err(EngineError::MalformedInput(
            "Question content must be non-empty and points at least 1".to_string(),
        ));
    }
    if options.is_empty() {
        return Err(EngineError::MalformedInput(
            "Questions need at least one option".to_string(),
        ));
    }
    validate_option_set(kind, &options)?;

    sqlx::query(
        r#"
        UPDATE questions
        SET kind = ?, content = ?, points = ?, options = ?, position = ?
        WHERE id = ?
        "#,
    )
    .bind(kind)
    .bind(content)
    .bind(points)
    .bind(Json(options))
    .bind(position)
    .bind(question_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Deletes a question by id. Admin only.
pub async fn delete_question(
    pool: &SqlitePool,
    roles: &dyn RoleProvider,
    user_id: &str,
    question_id: i64,
) -> Result<(), EngineError> {
    ensure_admin(roles, user_id).await?;

    let result = sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(question_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::NotFound("Question not found".to_string()));
    }

    Ok(())
}

fn normalize_prerequisites(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Every referenced prerequisite must be an existing module.
async fn ensure_modules_exist(pool: &SqlitePool, ids: &[i64]) -> Result<(), EngineError> {
    if ids.is_empty() {
        return Ok(());
    }

    let mut query_builder = QueryBuilder::<Sqlite>::new("SELECT id FROM modules WHERE id IN (");
    let mut separated = query_builder.separated(",");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let found: Vec<i64> = query_builder.build_query_scalar().fetch_all(pool).await?;
    let found: HashSet<i64> = found.into_iter().collect();

    if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
        return Err(EngineError::NotFound(format!(
            "Prerequisite module {} not found",
            missing
        )));
    }

    Ok(())
}

/// Rejects edits that would make `module_id` reachable from its own
/// prerequisites. Two modules naming each other would otherwise deadlock
/// every user at runtime.
async fn ensure_acyclic(
    pool: &SqlitePool,
    module_id: i64,
    new_prereqs: &[i64],
) -> Result<(), EngineError> {
    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, prerequisites FROM modules")
        .fetch_all(pool)
        .await?;

    let mut graph: HashMap<i64, Vec<i64>> = rows
        .into_iter()
        .map(|(id, raw)| (id, parse_prerequisites(id, &raw)))
        .collect();
    graph.insert(module_id, new_prereqs.to_vec());

    let mut stack: Vec<i64> = new_prereqs.to_vec();
    let mut visited = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == module_id {
            return Err(EngineError::Conflict(format!(
                "Prerequisite edit would create a cycle through module {}",
                module_id
            )));
        }
        if !visited.insert(node) {
            continue;
        }
        if let Some(next) = graph.get(&node) {
            stack.extend(next.iter().copied());
        }
    }

    Ok(())
}

/// Creates a new training module. Admin only.
/// Prerequisites are stored as a typed, validated id list.
pub async fn create_module(
    pool: &SqlitePool,
    roles: &dyn RoleProvider,
    user_id: &str,
    payload: CreateModuleRequest,
) -> Result<i64, EngineError> {
    ensure_admin(roles, user_id).await?;
    payload.validate()?;

    let prereqs = normalize_prerequisites(&payload.prerequisites);
    ensure_modules_exist(pool, &prereqs).await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO modules (title, content, active, prerequisites, created_at)
        VALUES (?, ?, 1, ?, ?)
        RETURNING id
        "#,
    )
    .bind(payload.title)
    .bind(payload.content)
    .bind(serde_json::to_string(&prereqs)?)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create module: {:?}", e);
        EngineError::Database(e.to_string())
    })?;

    Ok(id)
}

/// Updates a module by id. Admin only.
/// Prerequisite edits are validated for existence and acyclicity before they
/// are written.
pub async fn update_module(
    pool: &SqlitePool,
    roles: &dyn RoleProvider,
    user_id: &str,
    module_id: i64,
    payload: UpdateModuleRequest,
) -> Result<(), EngineError> {
    ensure_admin(roles, user_id).await?;

    if payload.title.is_none()
        && payload.content.is_none()
        && payload.active.is_none()
        && payload.prerequisites.is_none()
    {
        return Ok(());
    }

    let prereqs = match payload.prerequisites {
        Some(ref ids) => {
            let prereqs = normalize_prerequisites(ids);
            if prereqs.contains(&module_id) {
                return Err(EngineError::Conflict(
                    "A module cannot be its own prerequisite".to_string(),
                ));
            }
            ensure_modules_exist(pool, &prereqs).await?;
            ensure_acyclic(pool, module_id, &prereqs).await?;
            Some(prereqs)
        }
        None => None,
    };

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE modules SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(content) = payload.content {
        separated.push("content = ");
        separated.push_bind_unseparated(content);
    }

    if let Some(active) = payload.active {
        separated.push("active = ");
        separated.push_bind_unseparated(active);
    }

    if let Some(prereqs) = prereqs {
        separated.push("prerequisites = ");
        separated.push_bind_unseparated(serde_json::to_string(&prereqs)?);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(module_id);

    let result = builder.build().execute(pool).await.map_err(|e| {
        tracing::error!("Failed to update module: {:?}", e);
        EngineError::Database(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(EngineError::NotFound("Module not found".to_string()));
    }

    Ok(())
}

/// Hard-deletes a module. Admin only.
/// Permitted only while no progress rows reference it and no other module
/// declares it as a prerequisite.
pub async fn delete_module(
    pool: &SqlitePool,
    roles: &dyn RoleProvider,
    user_id: &str,
    module_id: i64,
) -> Result<(), EngineError> {
    ensure_admin(roles, user_id).await?;

    let progress_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM training_progress WHERE module_id = ?")
            .bind(module_id)
            .fetch_one(pool)
            .await?;

    if progress_count > 0 {
        return Err(EngineError::Conflict(format!(
            "Module {} has {} progress record(s); deactivate it instead",
            module_id, progress_count
        )));
    }

    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, prerequisites FROM modules")
        .fetch_all(pool)
        .await?;

    if let Some((dependent, _)) = rows
        .iter()
        .find(|(id, raw)| *id != module_id && parse_prerequisites(*id, raw).contains(&module_id))
    {
        return Err(EngineError::Conflict(format!(
            "Module {} is a prerequisite of module {}",
            module_id, dependent
        )));
    }

    let result = sqlx::query("DELETE FROM modules WHERE id = ?")
        .bind(module_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::NotFound("Module not found".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_set_single_requires_one_correct() {
        let options = vec![
            AnswerOption {
                text: "A".to_string(),
                correct: true,
            },
            AnswerOption {
                text: "B".to_string(),
                correct: true,
            },
        ];
        assert!(validate_option_set(QuestionKind::Single, &options).is_err());
        assert!(validate_option_set(QuestionKind::Multi, &options).is_ok());
    }

    #[test]
    fn test_option_set_true_false_arity() {
        let options = vec![
            AnswerOption {
                text: "True".to_string(),
                correct: true,
            },
            AnswerOption {
                text: "False".to_string(),
                correct: false,
            },
        ];
        assert!(validate_option_set(QuestionKind::TrueFalse, &options).is_ok());

        let three = vec![
            options[0].clone(),
            options[1].clone(),
            AnswerOption {
                text: "Maybe".to_string(),
                correct: false,
            },
        ];
        assert!(validate_option_set(QuestionKind::TrueFalse, &three).is_err());
    }

    #[test]
    fn test_normalize_prerequisites_dedupes() {
        assert_eq!(normalize_prerequisites(&[2, 1, 2, 3, 1]), vec![2, 1, 3]);
    }
}
