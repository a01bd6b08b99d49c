// tests/content_admin_tests.rs

use attempt_engine::{
    EngineError, db,
    models::{
        assessment::{
            AnswerOption, AssessmentKind, CreateAssessmentRequest, CreateQuestionRequest,
            QuestionKind, UpdateAssessmentRequest, UpdateQuestionRequest,
        },
        training::{CreateModuleRequest, UpdateModuleRequest},
    },
    services::{attempts, content, content::RoleProvider},
};
use sqlx::SqlitePool;

struct StaticRoles(bool);

#[async_trait::async_trait]
impl RoleProvider for StaticRoles {
    async fn can_administer(&self, _user_id: &str) -> Result<bool, EngineError> {
        Ok(self.0)
    }
}

async fn test_pool() -> SqlitePool {
    let pool = db::connect("sqlite::memory:", 1)
        .await
        .expect("Failed to open in-memory database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to migrate database");
    pool
}

fn option(text: &str, correct: bool) -> AnswerOption {
    AnswerOption {
        text: text.to_string(),
        correct,
    }
}

fn quiz_request(title: &str) -> CreateAssessmentRequest {
    CreateAssessmentRequest {
        kind: AssessmentKind::Quiz,
        title: title.to_string(),
        pass_threshold: Some(10),
        game_config: None,
    }
}

#[tokio::test]
async fn non_admin_callers_are_rejected() {
    let pool = test_pool().await;
    let deny = StaticRoles(false);

    let err = content::create_assessment(&pool, &deny, "mallory", quiz_request("Quiz"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = content::create_module(
        &pool,
        &deny,
        "mallory",
        CreateModuleRequest {
            title: "Module".to_string(),
            content: String::new(),
            prerequisites: vec![],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn quiz_requires_pass_threshold_and_game_rejects_one() {
    let pool = test_pool().await;
    let admin = StaticRoles(true);

    let err = content::create_assessment(
        &pool,
        &admin,
        "admin",
        CreateAssessmentRequest {
            kind: AssessmentKind::Quiz,
            title: "No threshold".to_string(),
            pass_threshold: None,
            game_config: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::MalformedInput(_)));

    let err = content::create_assessment(
        &pool,
        &admin,
        "admin",
        CreateAssessmentRequest {
            kind: AssessmentKind::Game,
            title: "Game with threshold".to_string(),
            pass_threshold: Some(5),
            game_config: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::MalformedInput(_)));
}

#[tokio::test]
async fn question_option_sets_are_validated() {
    let pool = test_pool().await;
    let admin = StaticRoles(true);
    let quiz_id = content::create_assessment(&pool, &admin, "admin", quiz_request("Quiz"))
        .await
        .unwrap();

    // No correct option at all.
    let err = content::create_question(
        &pool,
        &admin,
        "admin",
        quiz_id,
        CreateQuestionRequest {
            kind: QuestionKind::Single,
            content: "Pick one".to_string(),
            points: 5,
            options: vec![option("A", false), option("B", false)],
            position: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::MalformedInput(_)));

    // True/false with three options.
    let err = content::create_question(
        &pool,
        &admin,
        "admin",
        quiz_id,
        CreateQuestionRequest {
            kind: QuestionKind::TrueFalse,
            content: "True or false".to_string(),
            points: 5,
            options: vec![option("True", true), option("False", false), option("Maybe", false)],
            position: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::MalformedInput(_)));

    // A kind change through update cannot bypass the rules.
    let question_id = content::create_question(
        &pool,
        &admin,
        "admin",
        quiz_id,
        CreateQuestionRequest {
            kind: QuestionKind::Multi,
            content: "Pick any".to_string(),
            points: 5,
            options: vec![option("A", true), option("B", true)],
            position: None,
        },
    )
    .await
    .unwrap();

    let err = content::update_question(
        &pool,
        &admin,
        "admin",
        question_id,
        UpdateQuestionRequest {
            kind: Some(QuestionKind::Single),
            content: None,
            points: None,
            options: None,
            position: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::MalformedInput(_)));
}

#[tokio::test]
async fn questions_cannot_be_attached_to_games() {
    let pool = test_pool().await;
    let admin = StaticRoles(true);
    let game_id = content::create_assessment(
        &pool,
        &admin,
        "admin",
        CreateAssessmentRequest {
            kind: AssessmentKind::Game,
            title: "Game".to_string(),
            pass_threshold: None,
            game_config: None,
        },
    )
    .await
    .unwrap();

    let err = content::create_question(
        &pool,
        &admin,
        "admin",
        game_id,
        CreateQuestionRequest {
            kind: QuestionKind::Single,
            content: "Pick one".to_string(),
            points: 5,
            options: vec![option("A", true)],
            position: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn deactivation_hides_assessment_and_delete_requires_no_attempts() {
    let pool = test_pool().await;
    let admin = StaticRoles(true);
    let quiz_id = content::create_assessment(&pool, &admin, "admin", quiz_request("Quiz"))
        .await
        .unwrap();
    content::create_question(
        &pool,
        &admin,
        "admin",
        quiz_id,
        CreateQuestionRequest {
            kind: QuestionKind::Single,
            content: "Pick one".to_string(),
            points: 5,
            options: vec![option("A", true)],
            position: None,
        },
    )
    .await
    .unwrap();

    let started = attempts::start(&pool, "alice", quiz_id).await.unwrap();
    assert!(started.attempt_id > 0);

    // With an attempt on record, hard delete is refused.
    let err = content::delete_assessment(&pool, &admin, "admin", quiz_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    // Deactivation is the supported path; the quiz disappears for users.
    content::update_assessment(
        &pool,
        &admin,
        "admin",
        quiz_id,
        UpdateAssessmentRequest {
            title: None,
            active: Some(false),
            pass_threshold: None,
            game_config: None,
        },
    )
    .await
    .unwrap();
    let err = attempts::start(&pool, "bob", quiz_id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    // A fresh, never-attempted assessment deletes cleanly along with its questions.
    let other_id = content::create_assessment(&pool, &admin, "admin", quiz_request("Other"))
        .await
        .unwrap();
    content::create_question(
        &pool,
        &admin,
        "admin",
        other_id,
        CreateQuestionRequest {
            kind: QuestionKind::Single,
            content: "Pick one".to_string(),
            points: 5,
            options: vec![option("A", true)],
            position: None,
        },
    )
    .await
    .unwrap();
    content::delete_assessment(&pool, &admin, "admin", other_id)
        .await
        .unwrap();

    let question_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE assessment_id = ?")
            .bind(other_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(question_count, 0);
    let err = attempts::start(&pool, "carol", other_id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn module_prerequisite_edits_reject_cycles() {
    let pool = test_pool().await;
    let admin = StaticRoles(true);

    let a = content::create_module(
        &pool,
        &admin,
        "admin",
        CreateModuleRequest {
            title: "A".to_string(),
            content: String::new(),
            prerequisites: vec![],
        },
    )
    .await
    .unwrap();
    let b = content::create_module(
        &pool,
        &admin,
        "admin",
        CreateModuleRequest {
            title: "B".to_string(),
            content: String::new(),
            prerequisites: vec![a],
        },
    )
    .await
    .unwrap();
    let c = content::create_module(
        &pool,
        &admin,
        "admin",
        CreateModuleRequest {
            title: "C".to_string(),
            content: String::new(),
            prerequisites: vec![b],
        },
    )
    .await
    .unwrap();

    // A -> B -> C closing back to A.
    let err = content::update_module(
        &pool,
        &admin,
        "admin",
        a,
        UpdateModuleRequest {
            title: None,
            content: None,
            active: None,
            prerequisites: Some(vec![c]),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    // Self-reference.
    let err = content::update_module(
        &pool,
        &admin,
        "admin",
        a,
        UpdateModuleRequest {
            title: None,
            content: None,
            active: None,
            prerequisites: Some(vec![a]),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    // Unknown prerequisite id.
    let err = content::update_module(
        &pool,
        &admin,
        "admin",
        a,
        UpdateModuleRequest {
            title: None,
            content: None,
            active: None,
            prerequisites: Some(vec![999]),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    // An acyclic edit still goes through.
    content::update_module(
        &pool,
        &admin,
        "admin",
        c,
        UpdateModuleRequest {
            title: None,
            content: None,
            active: None,
            prerequisites: Some(vec![a, b]),
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn module_delete_refuses_referenced_modules() {
    let pool = test_pool().await;
    let admin = StaticRoles(true);

    let a = content::create_module(
        &pool,
        &admin,
        "admin",
        CreateModuleRequest {
            title: "A".to_string(),
            content: String::new(),
            prerequisites: vec![],
        },
    )
    .await
    .unwrap();
    let b = content::create_module(
        &pool,
        &admin,
        "admin",
        CreateModuleRequest {
            title: "B".to_string(),
            content: String::new(),
            prerequisites: vec![a],
        },
    )
    .await
    .unwrap();

    // A is a prerequisite of B.
    let err = content::delete_module(&pool, &admin, "admin", a)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    // B has no dependents and no progress rows.
    content::delete_module(&pool, &admin, "admin", b).await.unwrap();
    content::delete_module(&pool, &admin, "admin", a).await.unwrap();
}
