use std::env;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::{get, patch, post},
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
            "/api/manage/quizzes/:id/publish",
            post(routes::quiz::publish_quiz),
        )
        .route(
            "/api/manage/quizzes/:id/analytics",
            get(routes::quiz::quiz_analytics),
        )
        .layer(axum::middleware::from_fn(middleware::auth::require_staff));

    let learner_api = Router::new()
        .route(
            "/api/learner/quizzes/:id/attempts",
            post(routes::attempt::start_attempt),
        )
        .route(
            "/api/learner/quizzes/:id/results",
            get(routes::attempt::quiz_results),
        )
        .route(
            "/api/learner/attempts/:id",
            get(routes::attempt::attempt_status),
        )
        .route(
            "/api/learner/attempts/:id/answer",
            patch(routes::attempt::save_answer),
        )
        .route(
            "/api/learner/attempts/:id/submit",
            post(routes::attempt::submit_attempt),
        )
        .route(
            "/api/learner/attempts/:id/abandon",
            post(routes::attempt::abandon_attempt),
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

fn staff_request(method: &str, uri: &str, staff_id: Uuid, body: Option<JsonValue>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", staff_id.to_string())
        .header("x-user-role", "instructor")
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn learner_request(
    method: &str,
    uri: &str,
    learner_id: Uuid,
    body: Option<JsonValue>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", learner_id.to_string())
        .header("x-user-role", "learner")
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn two_question_quiz() -> JsonValue {
    json!({
        "title": "Fundamentals check",
        "quiz_type": "assessment",
        "settings": {
            "time_limit_minutes": 30,
            "per_question_seconds": null,
            "max_attempts": 1,
            "allow_retake": true,
            "passing_score": 60.0,
            "shuffle_questions": false,
            "shuffle_options": false,
            "show_results": "full",
            "allow_backtracking": true
        },
        "questions": [
            {
                "text": "Pick A",
                "points": 5,
                "type": "multiple_choice",
                "options": [
                    {"text": "A", "correct": true},
                    {"text": "B", "correct": false},
                    {"text": "C", "correct": false}
                ]
            },
            {
                "text": "Pick B and C",
                "points": 5,
                "type": "multiple_choice",
                "options": [
                    {"text": "A", "correct": false},
                    {"text": "B", "correct": true},
                    {"text": "C", "correct": true}
                ]
            }
        ]
    })
}

/// Find the ids of the options whose text is listed, from the authoring
/// view of one question.
fn option_ids(question: &JsonValue, texts: &[&str]) -> Vec<String> {
    question["options"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|o| texts.contains(&o["text"].as_str().unwrap()))
        .map(|o| o["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn learner_flow_end_to_end() {
    init_test_config();
    let app = build_app();
    let staff = Uuid::new_v4();
    let learner = Uuid::new_v4();

    // Author and publish a 2-question quiz worth 10 points.
    let (status, quiz) = send(
        &app,
        staff_request("POST", "/api/manage/quizzes", staff, Some(two_question_quiz())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(quiz["total_points"], 10);
    let quiz_id = quiz["id"].as_str().unwrap().to_string();

    let (status, published) = send(
        &app,
        staff_request(
            "POST",
            &format!("/api/manage/quizzes/{}/publish", quiz_id),
            staff,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["status"], "published");

    // Start an attempt; the learner view must not leak answer keys.
    let (status, started) = send(
        &app,
        learner_request(
            "POST",
            &format!("/api/learner/quizzes/{}/attempts", quiz_id),
            learner,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(started["attempt_number"], 1);
    let attempt_id = started["attempt_id"].as_str().unwrap().to_string();
    for question in started["questions"].as_array().unwrap() {
        for option in question["options"].as_array().unwrap() {
            assert!(option.get("correct").is_none(), "key leaked to learner");
        }
    }

    // Submit {A} for question 1 and {B} for question 2: 5 of 10 -> 50.
    let q1 = &quiz["questions"][0];
    let q2 = &quiz["questions"][1];
    let submit_body = json!({
        "answers": [
            {
                "question_id": q1["id"],
                "answer": {"kind": "selection", "option_ids": option_ids(q1, &["A"])},
                "time_spent_seconds": 20
            },
            {
                "question_id": q2["id"],
                "answer": {"kind": "selection", "option_ids": option_ids(q2, &["B"])},
                "time_spent_seconds": 30
            }
        ]
    });
    let (status, result) = send(
        &app,
        learner_request(
            "POST",
            &format!("/api/learner/attempts/{}/submit", attempt_id),
            learner,
            Some(submit_body),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["status"], "submitted");
    assert_eq!(result["score"], 50.0);
    assert_eq!(result["passed"], false);
    let details = result["answers"].as_array().unwrap();
    assert_eq!(details.len(), 2);

    // Submitting a concluded attempt is a state conflict, not a re-score.
    let (status, body) = send(
        &app,
        learner_request(
            "POST",
            &format!("/api/learner/attempts/{}/submit", attempt_id),
            learner,
            Some(json!({"answers": []})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "state_conflict");

    // The ceiling of one attempt holds.
    let (status, body) = send(
        &app,
        learner_request(
            "POST",
            &format!("/api/learner/quizzes/{}/attempts", quiz_id),
            learner,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "attempt_limit_exceeded");

    // Results return the graded attempt.
    let (status, results) = send(
        &app,
        learner_request(
            "GET",
            &format!("/api/learner/quizzes/{}/results", quiz_id),
            learner,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["score"], 50.0);

    // Analytics reflect the single graded attempt.
    let (status, analytics) = send(
        &app,
        staff_request(
            "GET",
            &format!("/api/manage/quizzes/{}/analytics", quiz_id),
            staff,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analytics["analytics"]["graded_attempts"], 1);
    assert_eq!(analytics["analytics"]["average_score"], 50.0);
    assert_eq!(analytics["analytics"]["pass_rate"], 0.0);
    let rows = analytics["questions"].as_array().unwrap();
    assert_eq!(rows[0]["accuracy"], 1.0);
    assert_eq!(rows[1]["accuracy"], 0.0);
}

#[tokio::test]
async fn identity_and_role_gates() {
    init_test_config();
    let app = build_app();

    // No identity headers -> 401.
    let req = Request::builder()
        .method("POST")
        .uri("/api/manage/quizzes")
        .header("content-type", "application/json")
        .body(Body::from(two_question_quiz().to_string()))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Learners cannot reach the management surface.
    let (status, _) = send(
        &app,
        learner_request(
            "POST",
            "/api/manage/quizzes",
            Uuid::new_v4(),
            Some(two_question_quiz()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Unknown quiz -> 404.
    let (status, body) = send(
        &app,
        learner_request(
            "GET",
            &format!("/api/learner/quizzes/{}/results", Uuid::new_v4()),
            Uuid::new_v4(),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn abandoned_attempt_counts_in_abandonment_rate() {
    init_test_config();
    let app = build_app();
    let staff = Uuid::new_v4();
    let learner = Uuid::new_v4();

    let (_, quiz) = send(
        &app,
        staff_request("POST", "/api/manage/quizzes", staff, Some(two_question_quiz())),
    )
    .await;
    let quiz_id = quiz["id"].as_str().unwrap().to_string();
    send(
        &app,
        staff_request(
            "POST",
            &format!("/api/manage/quizzes/{}/publish", quiz_id),
            staff,
            None,
        ),
    )
    .await;

    let (_, started) = send(
        &app,
        learner_request(
            "POST",
            &format!("/api/learner/quizzes/{}/attempts", quiz_id),
            learner,
            None,
        ),
    )
    .await;
    let attempt_id = started["attempt_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        learner_request(
            "POST",
            &format!("/api/learner/attempts/{}/abandon", attempt_id),
            learner,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "abandoned");

    let (_, analytics) = send(
        &app,
        staff_request(
            "GET",
            &format!("/api/manage/quizzes/{}/analytics", quiz_id),
            staff,
            None,
        ),
    )
    .await;
    assert_eq!(analytics["analytics"]["abandonment_rate"], 1.0);
    assert_eq!(analytics["analytics"]["graded_attempts"], 0);

    // Abandoned attempts yield no results.
    let (status, _) = send(
        &app,
        learner_request(
            "GET",
            &format!("/api/learner/quizzes/{}/results", quiz_id),
            learner,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
