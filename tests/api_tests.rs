use adaptive_quiz::api::{create_router, AppState};
use adaptive_quiz::assembler::QuizAssembler;
use adaptive_quiz::database::{BankCollection, Database, SqliteBankStore};
use adaptive_quiz::generators::GeneratorRegistry;
use adaptive_quiz::mastery::MasteryModel;
use adaptive_quiz::models::{Candidate, QuestionSource};
use adaptive_quiz::question_cache::ClassQuestionCache;
use adaptive_quiz::quiz_service::QuizService;
use adaptive_quiz::source_fetcher::SourceFetcher;
use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::Duration;
use serde_json::{json, Value};
use std::sync::Arc;

async fn create_test_server() -> (TestServer, Database) {
    let db = Database::new("sqlite::memory:").await.unwrap();

    let fetcher = SourceFetcher::new(
        Arc::new(SqliteBankStore::new(db.clone(), BankCollection::Class)),
        Arc::new(SqliteBankStore::new(db.clone(), BankCollection::Personal)),
        Arc::new(SqliteBankStore::new(db.clone(), BankCollection::Shared)),
        ClassQuestionCache::new(32, Duration::minutes(5)),
    );
    let assembler = QuizAssembler::new(fetcher, GeneratorRegistry::with_builtin_generators(), MasteryModel::new());
    let store = Arc::new(db.clone());
    let quiz_service = QuizService::new(assembler, store.clone(), store, 0.5);

    let app = create_router(AppState {
        quiz_service,
        db: db.clone(),
    });
    (TestServer::new(app).unwrap(), db)
}

fn bank_question(question: &str) -> Candidate {
    Candidate {
        question: question.to_string(),
        options: None,
        correct_answer: "42".to_string(),
        topic: "geometry".to_string(),
        concept: None,
        subtopic: None,
        question_id: None,
        source: QuestionSource::SharedQuestionBank,
        difficulty: None,
    }
}

#[tokio::test]
async fn test_api_start_quiz_with_builtin_generator() {
    let (server, _db) = create_test_server().await;

    let response = server
        .post("/api/quiz/start")
        .json(&json!({
            "userId": "learner-1",
            "topic": "arithmetic",
            "grade": 3,
            "dailyGoal": 3
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["topic"], "arithmetic");
    assert_eq!(body["data"]["questions"].as_array().unwrap().len(), 3);
    assert_eq!(body["data"]["questions"][0]["source"], "generated");
    assert_eq!(body["data"]["targetDifficulty"], 0.5);
    assert!(body["data"]["warnings"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_api_start_quiz_reports_shortfall_for_bank_only_topic() {
    let (server, db) = create_test_server().await;
    db.insert_bank_question(BankCollection::Shared, None, 6, &bank_question("Angle sum of a triangle?"))
        .await
        .unwrap();

    let response = server
        .post("/api/quiz/start")
        .json(&json!({
            "userId": "learner-1",
            "topic": "geometry",
            "grade": 6,
            "dailyGoal": 2
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["questions"].as_array().unwrap().len(), 1);
    let warning = &body["data"]["warnings"][0];
    assert_eq!(warning["type"], "shortfall");
    assert_eq!(warning["requested"], 2);
    assert_eq!(warning["achieved"], 1);
    assert_eq!(warning["generatorAvailable"], false);
}

#[tokio::test]
async fn test_api_start_quiz_validation() {
    let (server, _db) = create_test_server().await;

    let response = server
        .post("/api/quiz/start")
        .json(&json!({
            "userId": "learner-1",
            "topic": "  ",
            "grade": 3,
            "dailyGoal": 3
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("topic"));
}

#[tokio::test]
async fn test_api_missing_bank_table_maps_to_service_unavailable() {
    let (server, db) = create_test_server().await;
    sqlx::query("DROP TABLE shared_questions")
        .execute(db.pool())
        .await
        .unwrap();

    let response = server
        .post("/api/quiz/start")
        .json(&json!({
            "userId": "learner-1",
            "topic": "geometry",
            "grade": 6,
            "dailyGoal": 2
        }))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("missing-index"));
}

#[tokio::test]
async fn test_api_record_answer_and_mastery_report() {
    let (server, db) = create_test_server().await;

    for (i, correct) in [false, true, false].iter().enumerate() {
        let response = server
            .post("/api/users/learner-1/answers")
            .json(&json!({
                "topic": "fractions",
                "question": format!("Fraction question {}", i),
                "correctAnswer": "1/2",
                "isCorrect": correct,
                "timestamp": format!("2026-05-0{}T09:00:00Z", i + 1),
                "timeTakenSeconds": 20.0,
                "questionId": format!("bank-{}", i)
            }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["bankQuestionRecorded"], true);
    }

    use adaptive_quiz::bank_store::HistoryStore;
    assert_eq!(db.load_answered_bank_ids("learner-1").await.unwrap().len(), 3);

    let response = server.get("/api/users/learner-1/mastery").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["userId"], "learner-1");
    assert_eq!(body["data"]["perTopic"][0]["topic"], "fractions");
    assert_eq!(body["data"]["mostComplexRecent"].as_array().unwrap().len(), 3);
    assert_eq!(body["data"]["mostComplexRecent"][0]["isCorrect"], false);
}

#[tokio::test]
async fn test_api_record_answer_rejects_empty_question() {
    let (server, _db) = create_test_server().await;

    let response = server
        .post("/api/users/learner-1/answers")
        .json(&json!({
            "topic": "fractions",
            "question": "",
            "correctAnswer": "1/2",
            "isCorrect": true,
            "timestamp": "2026-05-01T09:00:00Z",
            "timeTakenSeconds": 20.0
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_health_reports_cache_stats() {
    let (server, _db) = create_test_server().await;

    let response = server.get("/api/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["classCache"]["maxSize"], 32);
    assert_eq!(body["data"]["classCache"]["totalEntries"], 0);
}
