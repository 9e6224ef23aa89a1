use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::{
    database::Database,
    errors::{ApiError, ErrorContext},
    models::*,
    question_cache::CacheStats,
    quiz_service::QuizService,
};

// Import logging macros
use crate::{log_api_error, log_api_start, log_api_success, log_api_warn, log_performance};

const MAX_DAILY_GOAL: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    pub quiz_service: QuizService,
    pub db: Database,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// An answered question, optionally tied to the bank question it came from.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAnswerRequest {
    #[serde(flatten)]
    pub record: AnsweredRecord,
    #[serde(default)]
    pub question_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAnswerResponse {
    pub user_id: String,
    pub bank_question_recorded: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub class_cache: CacheStats,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

fn validate_start_request(request: &StartQuizRequest) -> Result<(), ApiError> {
    if request.user_id.trim().is_empty() {
        return Err(ApiError::ValidationError("userId must not be empty".to_string()));
    }
    if request.topic.trim().is_empty() {
        return Err(ApiError::ValidationError("topic must not be empty".to_string()));
    }
    if request.daily_goal > MAX_DAILY_GOAL {
        return Err(ApiError::ValidationError(format!(
            "dailyGoal must be at most {}",
            MAX_DAILY_GOAL
        )));
    }
    if let Some(last) = request.last_asked_complexity {
        if !(0.0..=1.0).contains(&last) {
            return Err(ApiError::ValidationError(
                "lastAskedComplexity must be between 0 and 1".to_string(),
            ));
        }
    }
    Ok(())
}

// Quiz endpoints
pub async fn start_quiz(
    State(state): State<AppState>,
    Json(request): Json<StartQuizRequest>,
) -> ApiResult<AssembledQuiz> {
    log_api_start!("start_quiz", user_id = request.user_id);

    if let Err(error) = validate_start_request(&request) {
        let context = ErrorContext::new("start_quiz", "quiz").with_id(&request.user_id);
        return Err(error.to_response_with_context(context));
    }

    let started = Instant::now();
    let user_id = request.user_id.clone();

    match state.quiz_service.start_quiz(request).await {
        Ok(quiz) => {
            log_performance!(
                "start_quiz",
                duration_ms = started.elapsed().as_millis() as u64,
                count = quiz.questions.len()
            );
            if quiz.warnings.is_empty() {
                log_api_success!("start_quiz", user_id = user_id, "quiz assembled");
            } else {
                log_api_warn!("start_quiz", user_id = user_id, "quiz assembled with a shortfall");
            }
            Ok(Json(ApiResponse::success(quiz)))
        }
        Err(e) => {
            log_api_error!("start_quiz", user_id = user_id, error = e, "no questions available");
            let context = ErrorContext::new("start_quiz", "quiz")
                .with_id(&user_id)
                .with_user_message("No questions could be loaded for this topic. Please try again later.");
            Err(ApiError::SourceUnavailable(e).to_response_with_context(context))
        }
    }
}

// Learner endpoints
pub async fn get_mastery(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<MasteryReport> {
    log_api_start!("get_mastery", user_id = user_id);
    let started = Instant::now();

    match state.quiz_service.mastery_report(&user_id).await {
        Ok(report) => {
            log_performance!("get_mastery", duration_ms = started.elapsed().as_millis() as u64);
            log_api_success!("get_mastery", user_id = user_id, "mastery report built");
            Ok(Json(ApiResponse::success(report)))
        }
        Err(e) => {
            let context = ErrorContext::new("get_mastery", "mastery_report").with_id(&user_id);
            Err(ApiError::DatabaseError(e).to_response_with_context(context))
        }
    }
}

pub async fn record_answer(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<RecordAnswerRequest>,
) -> ApiResult<RecordAnswerResponse> {
    log_api_start!("record_answer", user_id = user_id);

    if request.record.question.trim().is_empty() || request.record.topic.trim().is_empty() {
        let context = ErrorContext::new("record_answer", "answer").with_id(&user_id);
        return Err(ApiError::ValidationError("question and topic must not be empty".to_string())
            .to_response_with_context(context));
    }

    if let Err(e) = state.db.record_answer(&user_id, &request.record).await {
        let context = ErrorContext::new("record_answer", "answer").with_id(&user_id);
        return Err(ApiError::DatabaseError(e).to_response_with_context(context));
    }

    let bank_question_recorded = match request.question_id.as_deref() {
        Some(question_id) => {
            if let Err(e) = state.db.record_bank_answer(&user_id, question_id).await {
                let context = ErrorContext::new("record_answer", "bank_answer").with_id(question_id);
                return Err(ApiError::DatabaseError(e).to_response_with_context(context));
            }
            true
        }
        None => false,
    };

    log_api_success!("record_answer", user_id = user_id, "answer recorded");
    Ok(Json(ApiResponse::success(RecordAnswerResponse {
        user_id,
        bank_question_recorded,
    })))
}

pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    log_api_start!("health");
    let class_cache = state.quiz_service.assembler().fetcher().cache().stats().await;
    Json(ApiResponse::success(HealthResponse {
        status: "ok",
        class_cache,
    }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/quiz/start", post(start_quiz))
        .route("/api/users/:user_id/mastery", get(get_mastery))
        .route("/api/users/:user_id/answers", post(record_answer))
        .route("/api/health", get(health))
        .with_state(state)
}
