use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::dto::attempt_dto::{
    learner_questions, AttemptResultResponse, AttemptStatusResponse, ProctoringEventRequest,
    SaveAnswerRequest, SaveAnswerResponse, StartAttemptResponse, SubmitAttemptRequest,
};
use crate::error::Result;
use crate::services::access_service::Actor;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/learner/quizzes/{id}/attempts",
    params(("id" = Uuid, Path, description = "Quiz ID")),
    responses(
        (status = 201, description = "Attempt opened", body = StartAttemptResponse),
        (status = 409, description = "Attempt limit reached, retake not allowed, or quiz not published")
    )
)]
#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(quiz_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (attempt, quiz) = state.attempt_service.start_attempt(actor.id, quiz_id).await?;
    let response = StartAttemptResponse {
        attempt_id: attempt.id,
        attempt_number: attempt.attempt_number,
        status: attempt.status,
        started_at: attempt.started_at,
        deadline: attempt.deadline,
        per_question_seconds: quiz.settings.per_question_seconds,
        allow_backtracking: quiz.settings.allow_backtracking,
        questions: learner_questions(&quiz),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/api/learner/attempts/{id}",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    responses((status = 200, description = "Attempt progress", body = AttemptStatusResponse))
)]
#[axum::debug_handler]
pub async fn attempt_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (attempt, quiz) = state
        .attempt_service
        .attempt_with_quiz(actor.id, attempt_id)
        .await?;
    let time_remaining_seconds = attempt
        .deadline
        .map(|deadline| (deadline - Utc::now()).num_seconds().max(0));
    Ok(Json(AttemptStatusResponse {
        attempt_id: attempt.id,
        status: attempt.status,
        started_at: attempt.started_at,
        deadline: attempt.deadline,
        time_remaining_seconds,
        questions_answered: attempt.answers.len(),
        total_questions: quiz.questions.len(),
    }))
}

#[utoipa::path(
    patch,
    path = "/api/learner/attempts/{id}/answer",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    request_body = SaveAnswerRequest,
    responses(
        (status = 200, description = "Answer stored", body = SaveAnswerResponse),
        (status = 409, description = "Attempt is no longer in progress")
    )
)]
#[axum::debug_handler]
pub async fn save_answer(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(attempt_id): Path<Uuid>,
    Json(request): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse> {
    request.validate()?;
    let question_id = request.question_id;
    let timestamp = state
        .attempt_service
        .save_answer(actor.id, attempt_id, request)
        .await?;
    Ok(Json(SaveAnswerResponse {
        saved: true,
        question_id,
        timestamp,
    }))
}

#[utoipa::path(
    post,
    path = "/api/learner/attempts/{id}/submit",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    request_body = SubmitAttemptRequest,
    responses(
        (status = 200, description = "Attempt graded; detail gated by quiz settings", body = AttemptResultResponse),
        (status = 409, description = "Attempt is not in progress")
    )
)]
#[axum::debug_handler]
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(attempt_id): Path<Uuid>,
    Json(request): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse> {
    request.validate()?;
    let (attempt, quiz) = state
        .attempt_service
        .submit_attempt(actor.id, attempt_id, request.answers)
        .await?;
    Ok(Json(AttemptResultResponse::build(&attempt, &quiz)))
}

#[utoipa::path(
    post,
    path = "/api/learner/attempts/{id}/abandon",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    responses((status = 200, description = "Attempt abandoned"))
)]
#[axum::debug_handler]
pub async fn abandon_attempt(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (attempt, _) = state
        .attempt_service
        .abandon_attempt(actor.id, attempt_id)
        .await?;
    Ok(Json(json!({
        "attempt_id": attempt.id,
        "status": attempt.status.as_str(),
    })))
}

#[utoipa::path(
    post,
    path = "/api/learner/attempts/{id}/events",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    request_body = ProctoringEventRequest,
    responses((status = 204, description = "Event recorded"))
)]
#[axum::debug_handler]
pub async fn record_proctoring_event(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(attempt_id): Path<Uuid>,
    Json(request): Json<ProctoringEventRequest>,
) -> Result<impl IntoResponse> {
    request.validate()?;
    state
        .attempt_service
        .record_proctoring_event(actor.id, attempt_id, request.kind, request.detail)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/learner/quizzes/{id}/results",
    params(("id" = Uuid, Path, description = "Quiz ID")),
    responses(
        (status = 200, description = "Best graded attempt, detail gated by quiz settings", body = AttemptResultResponse),
        (status = 404, description = "No submissions found")
    )
)]
#[axum::debug_handler]
pub async fn quiz_results(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(quiz_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (attempt, quiz) = state.attempt_service.best_attempt(actor.id, quiz_id).await?;
    Ok(Json(AttemptResultResponse::build(&attempt, &quiz)))
}
