use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::attempt_dto::AttemptResultResponse;
use crate::dto::quiz_dto::{
    CreateQuizPayload, GradeAnswerPayload, PublishQuizResponse, QuizAnalyticsResponse,
    QuizResponse, ReviewAttemptSummary, UpdateQuizPayload,
};
use crate::error::Result;
use crate::services::access_service::Actor;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/manage/quizzes",
    request_body = CreateQuizPayload,
    responses(
        (status = 201, description = "Quiz created in draft", body = QuizResponse),
        (status = 400, description = "Invalid settings or question shape"),
        (status = 403, description = "Not allowed to manage quizzes")
    )
)]
#[axum::debug_handler]
pub async fn create_quiz(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateQuizPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let quiz = state.quiz_service.create_quiz(&actor, payload).await?;
    Ok((StatusCode::CREATED, Json(QuizResponse::from(quiz))))
}

#[utoipa::path(
    get,
    path = "/api/manage/quizzes/{id}",
    params(("id" = Uuid, Path, description = "Quiz ID")),
    responses(
        (status = 200, description = "Authoring view, keys included", body = QuizResponse),
        (status = 404, description = "Quiz not found")
    )
)]
#[axum::debug_handler]
pub async fn get_quiz(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let quiz = state.quiz_service.get_quiz(&actor, id).await?;
    Ok(Json(QuizResponse::from(quiz)))
}

#[utoipa::path(
    patch,
    path = "/api/manage/quizzes/{id}",
    params(("id" = Uuid, Path, description = "Quiz ID")),
    request_body = UpdateQuizPayload,
    responses(
        (status = 200, description = "Quiz updated", body = QuizResponse),
        (status = 409, description = "Scoring-relevant fields frozen by concluded attempts")
    )
)]
#[axum::debug_handler]
pub async fn update_quiz(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuizPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let quiz = state.quiz_service.update_quiz(&actor, id, payload).await?;
    Ok(Json(QuizResponse::from(quiz)))
}

#[utoipa::path(
    post,
    path = "/api/manage/quizzes/{id}/publish",
    params(("id" = Uuid, Path, description = "Quiz ID")),
    responses(
        (status = 200, description = "Quiz published", body = PublishQuizResponse),
        (status = 409, description = "Quiz is archived")
    )
)]
#[axum::debug_handler]
pub async fn publish_quiz(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (quiz, published_at) = state.quiz_service.publish_quiz(&actor, id).await?;
    Ok(Json(PublishQuizResponse {
        quiz_id: quiz.id,
        status: quiz.status,
        published_at,
    }))
}

#[utoipa::path(
    post,
    path = "/api/manage/quizzes/{id}/archive",
    params(("id" = Uuid, Path, description = "Quiz ID")),
    responses((status = 200, description = "Quiz archived", body = QuizResponse))
)]
#[axum::debug_handler]
pub async fn archive_quiz(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let quiz = state.quiz_service.archive_quiz(&actor, id).await?;
    Ok(Json(QuizResponse::from(quiz)))
}

#[utoipa::path(
    get,
    path = "/api/manage/quizzes/{id}/analytics",
    params(("id" = Uuid, Path, description = "Quiz ID")),
    responses(
        (status = 200, description = "Aggregate and per-question statistics", body = QuizAnalyticsResponse),
        (status = 404, description = "Quiz not found")
    )
)]
#[axum::debug_handler]
pub async fn quiz_analytics(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let quiz = state.quiz_service.quiz_analytics(&actor, id).await?;
    Ok(Json(QuizAnalyticsResponse::from(&quiz)))
}

#[utoipa::path(
    get,
    path = "/api/manage/attempts/review",
    responses((status = 200, description = "Attempts waiting on a reviewer"))
)]
#[axum::debug_handler]
pub async fn list_review_queue(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse> {
    let attempts = state.attempt_service.attempts_awaiting_review(&actor).await?;
    let summaries: Vec<ReviewAttemptSummary> = attempts
        .iter()
        .map(|attempt| ReviewAttemptSummary {
            attempt_id: attempt.id,
            quiz_id: attempt.quiz_id,
            learner_id: attempt.learner_id,
            attempt_number: attempt.attempt_number,
            concluded_at: attempt.concluded_at,
            pending_answers: attempt.ungraded_answers(),
        })
        .collect();
    Ok(Json(summaries))
}

#[utoipa::path(
    post,
    path = "/api/manage/attempts/{id}/grade-answer",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    request_body = GradeAnswerPayload,
    responses(
        (status = 200, description = "Answer graded", body = AttemptResultResponse),
        (status = 409, description = "Attempt is not awaiting review")
    )
)]
#[axum::debug_handler]
pub async fn grade_answer(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GradeAnswerPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let (attempt, quiz) = state
        .attempt_service
        .grade_manual_answer(&actor, id, payload)
        .await?;
    Ok(Json(AttemptResultResponse::unrestricted(&attempt, &quiz)))
}
