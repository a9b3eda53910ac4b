use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use assessment_backend::services::access_service::RoleAccess;
use assessment_backend::services::notification_service::LogEventSink;
use assessment_backend::store::MemoryStore;
use assessment_backend::{
    config::{get_config, init_config},
    middleware, routes, AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let store = Arc::new(MemoryStore::new());
    let app_state = AppState::new(store, Arc::new(RoleAccess), Arc::new(LogEventSink));

    // Expiry sweeper: concludes in-progress attempts whose time limit has
    // elapsed, racing learner submissions safely.
    {
        let state = app_state.clone();
        let interval = Duration::from_secs(config.expiry_sweep_seconds);
        tokio::spawn(async move {
            loop {
                match state.attempt_service.expire_overdue().await {
                    Ok(0) => {}
                    Ok(expired) => info!(expired, "expiry sweep concluded overdue attempts"),
                    Err(e) => tracing::error!(error = ?e, "expiry sweeper error"),
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    let base_routes = Router::new().route("/health", get(routes::health::health));

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
            "/api/manage/quizzes/:id/analytics",
            get(routes::quiz::quiz_analytics),
        )
        .route(
            "/api/manage/attempts/review",
            get(routes::quiz::list_review_queue),
        )
        .route(
            "/api/manage/attempts/:id/grade-answer",
            post(routes::quiz::grade_answer),
        )
        .layer(axum::middleware::from_fn(middleware::auth::require_staff))
        .layer(axum::middleware::from_fn_with_state(
            middleware::rate_limit::new_rps_state(config.manage_rps),
            middleware::rate_limit::rps_middleware,
        ));

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
        .route(
            "/api/learner/attempts/:id/events",
            post(routes::attempt::record_proctoring_event),
        )
        .layer(axum::middleware::from_fn(middleware::auth::require_actor))
        .layer(axum::middleware::from_fn_with_state(
            middleware::rate_limit::new_rps_state(config.learner_rps),
            middleware::rate_limit::rps_middleware,
        ));

    let app = base_routes
        .merge(manage_api)
        .merge(learner_api)
        .with_state(app_state)
        .layer(middleware::cors::permissive_cors())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
