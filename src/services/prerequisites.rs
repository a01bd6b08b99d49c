// src/services/prerequisites.rs

use std::collections::HashSet;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{error::EngineError, models::training::PrereqCheck};

/// Parses a stored prerequisite declaration.
///
/// Fails open: a blob that doesn't parse as a JSON id array is treated as an
/// empty prerequisite list with a warning, so a bad declaration never blocks
/// legitimate progress. Duplicates are dropped, declared order kept.
pub(crate) fn parse_prerequisites(module_id: i64, raw: &str) -> Vec<i64> {
    match serde_json::from_str::<Vec<i64>>(raw) {
        Ok(mut ids) => {
            let mut seen = HashSet::new();
            ids.retain(|id| seen.insert(*id));
            ids
        }
        Err(e) => {
            tracing::warn!(
                "Malformed prerequisite list for module {}: {}; treating as empty",
                module_id,
                e
            );
            Vec::new()
        }
    }
}

/// Decides whether `user_id` may start `module_id`.
///
/// Only the module's direct declared prerequisites are inspected; a
/// prerequisite is satisfied iff a completed progress row exists for it. The
/// completed set is fetched in one batched query to bound latency on long
/// prerequisite lists.
pub async fn can_start(
    pool: &SqlitePool,
    user_id: &str,
    module_id: i64,
) -> Result<PrereqCheck, EngineError> {
    let raw: Option<String> = sqlx::query_scalar("SELECT prerequisites FROM modules WHERE id = ?")
        .bind(module_id)
        .fetch_optional(pool)
        .await?;

    let raw =
        raw.ok_or_else(|| EngineError::NotFound(format!("Module {} not found", module_id)))?;

    let declared = parse_prerequisites(module_id, &raw);
    if declared.is_empty() {
        return Ok(PrereqCheck {
            allowed: true,
            blocked_by: Vec::new(),
        });
    }

    let mut query_builder = QueryBuilder::<Sqlite>::new(
        "SELECT module_id FROM training_progress WHERE status = 'completed' AND user_id = ",
    );
    query_builder.push_bind(user_id);
    query_builder.push(" AND module_id IN (");

    let mut separated = query_builder.separated(",");
    for id in &declared {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let completed: Vec<i64> = query_builder.build_query_scalar().fetch_all(pool).await?;
    let completed: HashSet<i64> = completed.into_iter().collect();

    let blocked_by: Vec<i64> = declared
        .into_iter()
        .filter(|id| !completed.contains(id))
        .collect();

    Ok(PrereqCheck {
        allowed: blocked_by.is_empty(),
        blocked_by,
    })
}
