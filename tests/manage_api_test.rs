use std::env;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

use assessment_backend::services::access_service::RoleAccess;
use assessment_backend::services::notification_service::LogEventSink;
use assessment_backend::store::MemoryStore;
use assessment_backend::{middleware, routes, AppState};

fn init_test_config() {
    env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    env::set_var("MANAGE_RPS", "100");
    env::set_var("LEARNER_RPS", "100");
    env::set_var("EXPIRY_SWEEP_SECONDS", "60");
    env::set_var("COMMIT_RETRY_LIMIT", "3");
    let _ = assessment_backend::config::init_config();
}

fn build_app() -> Router {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store, Arc::new(RoleAccess), Arc::new(LogEventSink));

    let manage_api = Router::new()
        .route("/api/manage/quizzes", post(routes::quiz::create_quiz))
        .route(
            "/api/manage/quizzes/:id",
            get(routes::quiz::get_quiz).patch(routes::quiz::update_quiz),
        )
        .route(
            "/api/manage/quizzes/:id/publish",
            post(routes::quiz::publish_quiz),
        )
        .route(
            "/api/manage/quizzes/:id/archive",
            post(routes::quiz::archive_quiz),
        )
        .route(
            "/api/manage/attempts/review",
            get(routes::quiz::list_review_queue),
        )
        .route(
            "/api/manage/attempts/:id/grade-answer",
            post(routes::quiz::grade_answer),
        )
        .layer(axum::middleware::from_fn(middleware::auth::require_staff));

    let learner_api = Router::new()
        .route(
            "/api/learner/quizzes/:id/attempts",
            post(routes::attempt::start_attempt),
        )
        .route(
            "/api/learner/attempts/:id/submit",
            post(routes::attempt::submit_attempt),
        )
        .layer(axum::middleware::from_fn(middleware::auth::require_actor));

    manage_api.merge(learner_api).with_state(state)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, JsonValue) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn request(
    method: &str,
    uri: &str,
    user: Uuid,
    role: &str,
    body: Option<JsonValue>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", user.to_string())
        .header("x-user-role", role)
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn essay_quiz() -> JsonValue {
    json!({
        "title": "Written assessment",
        "quiz_type": "final",
        "settings": {
            "time_limit_minutes": null,
            "per_question_seconds": null,
            "max_attempts": 1,
            "allow_retake": false,
            "passing_score": 60.0,
            "shuffle_questions": false,
            "shuffle_options": false,
            "show_results": "score_only",
            "allow_backtracking": true
        },
        "questions": [
            {
                "text": "Explain ownership in Rust",
                "points": 10,
                "type": "essay",
                "guidelines": "Look for moves, borrows, lifetimes"
            }
        ]
    })
}

#[tokio::test]
async fn malformed_questions_are_rejected_up_front() {
    init_test_config();
    let app = build_app();
    let staff = Uuid::new_v4();

    // A choice question with no correct option never reaches storage.
    let payload = json!({
        "title": "Broken quiz",
        "quiz_type": "practice",
        "questions": [
            {
                "text": "Unanswerable",
                "points": 5,
                "type": "single_choice",
                "options": [
                    {"text": "A", "correct": false},
                    {"text": "B", "correct": false}
                ]
            }
        ]
    });
    let (status, body) = send(
        &app,
        request("POST", "/api/manage/quizzes", staff, "instructor", Some(payload)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_failed");

    // Out-of-range settings are invalid too.
    let payload = json!({
        "title": "Bad settings",
        "quiz_type": "practice",
        "settings": {
            "time_limit_minutes": null,
            "per_question_seconds": null,
            "max_attempts": 0,
            "allow_retake": false,
            "passing_score": 150.0,
            "shuffle_questions": false,
            "shuffle_options": false,
            "show_results": "full",
            "allow_backtracking": true
        },
        "questions": []
    });
    let (status, body) = send(
        &app,
        request("POST", "/api/manage/quizzes", staff, "instructor", Some(payload)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_failed");
}

#[tokio::test]
async fn publish_is_idempotent_and_archive_is_final() {
    init_test_config();
    let app = build_app();
    let staff = Uuid::new_v4();

    let (status, quiz) = send(
        &app,
        request("POST", "/api/manage/quizzes", staff, "instructor", Some(essay_quiz())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let quiz_id = quiz["id"].as_str().unwrap().to_string();

    let (_, first) = send(
        &app,
        request(
            "POST",
            &format!("/api/manage/quizzes/{}/publish", quiz_id),
            staff,
            "instructor",
            None,
        ),
    )
    .await;
    let (_, second) = send(
        &app,
        request(
            "POST",
            &format!("/api/manage/quizzes/{}/publish", quiz_id),
            staff,
            "instructor",
            None,
        ),
    )
    .await;
    assert_eq!(first["published_at"], second["published_at"]);

    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/api/manage/quizzes/{}/archive", quiz_id),
            staff,
            "instructor",
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/api/manage/quizzes/{}/publish", quiz_id),
            staff,
            "instructor",
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "state_conflict");
}

#[tokio::test]
async fn instructors_manage_only_their_own_quizzes() {
    init_test_config();
    let app = build_app();
    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();

    let (_, quiz) = send(
        &app,
        request("POST", "/api/manage/quizzes", owner, "instructor", Some(essay_quiz())),
    )
    .await;
    let quiz_id = quiz["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/api/manage/quizzes/{}/publish", quiz_id),
            other,
            "instructor",
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    // Admins may.
    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/api/manage/quizzes/{}/publish", quiz_id),
            Uuid::new_v4(),
            "admin",
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn essay_review_flow_over_http() {
    init_test_config();
    let app = build_app();
    let staff = Uuid::new_v4();
    let learner = Uuid::new_v4();

    let (_, quiz) = send(
        &app,
        request("POST", "/api/manage/quizzes", staff, "instructor", Some(essay_quiz())),
    )
    .await;
    let quiz_id = quiz["id"].as_str().unwrap().to_string();
    let question_id = quiz["questions"][0]["id"].as_str().unwrap().to_string();
    send(
        &app,
        request(
            "POST",
            &format!("/api/manage/quizzes/{}/publish", quiz_id),
            staff,
            "instructor",
            None,
        ),
    )
    .await;

    let (_, started) = send(
        &app,
        request(
            "POST",
            &format!("/api/learner/quizzes/{}/attempts", quiz_id),
            learner,
            "learner",
            None,
        ),
    )
    .await;
    let attempt_id = started["attempt_id"].as_str().unwrap().to_string();

    let submit_body = json!({
        "answers": [
            {
                "question_id": question_id,
                "answer": {"kind": "text", "text": "Ownership moves values; borrows lend them."},
                "time_spent_seconds": 240
            }
        ]
    });
    let (status, held) = send(
        &app,
        request(
            "POST",
            &format!("/api/learner/attempts/{}/submit", attempt_id),
            learner,
            "learner",
            Some(submit_body),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(held["status"], "awaiting_review");
    assert_eq!(held["pending_review"], true);
    assert!(held.get("score").is_none());

    // The attempt shows up in the review queue.
    let (_, queue) = send(
        &app,
        request("GET", "/api/manage/attempts/review", staff, "instructor", None),
    )
    .await;
    assert_eq!(queue.as_array().unwrap().len(), 1);
    assert_eq!(queue[0]["pending_answers"], 1);

    // 7 of 10 points: correct via the fixed threshold, score 70, passed.
    let (status, reviewed) = send(
        &app,
        request(
            "POST",
            &format!("/api/manage/attempts/{}/grade-answer", attempt_id),
            staff,
            "instructor",
            Some(json!({"question_id": question_id, "points_earned": 7.0})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviewed["status"], "submitted");
    assert_eq!(reviewed["score"], 70.0);
    assert_eq!(reviewed["passed"], true);
    assert_eq!(reviewed["answers"][0]["is_correct"], true);

    // The queue drains once nothing is pending.
    let (_, queue) = send(
        &app,
        request("GET", "/api/manage/attempts/review", staff, "instructor", None),
    )
    .await;
    assert_eq!(queue.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn scoring_fields_freeze_after_attempts() {
    init_test_config();
    let app = build_app();
    let staff = Uuid::new_v4();
    let learner = Uuid::new_v4();

    let (_, quiz) = send(
        &app,
        request("POST", "/api/manage/quizzes", staff, "instructor", Some(essay_quiz())),
    )
    .await;
    let quiz_id = quiz["id"].as_str().unwrap().to_string();
    send(
        &app,
        request(
            "POST",
            &format!("/api/manage/quizzes/{}/publish", quiz_id),
            staff,
            "instructor",
            None,
        ),
    )
    .await;

    let (_, started) = send(
        &app,
        request(
            "POST",
            &format!("/api/learner/quizzes/{}/attempts", quiz_id),
            learner,
            "learner",
            None,
        ),
    )
    .await;
    let attempt_id = started["attempt_id"].as_str().unwrap().to_string();
    send(
        &app,
        request(
            "POST",
            &format!("/api/learner/attempts/{}/submit", attempt_id),
            learner,
            "learner",
            Some(json!({"answers": []})),
        ),
    )
    .await;

    // Question list changes are frozen now.
    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &format!("/api/manage/quizzes/{}", quiz_id),
            staff,
            "instructor",
            Some(json!({
                "questions": [
                    {"text": "Replacement", "points": 3, "type": "true_false", "answer": true}
                ]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "state_conflict");

    // Title edits still pass.
    let (status, updated) = send(
        &app,
        request(
            "PATCH",
            &format!("/api/manage/quizzes/{}", quiz_id),
            staff,
            "instructor",
            Some(json!({"title": "Written assessment (v2 naming)"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Written assessment (v2 naming)");
}
