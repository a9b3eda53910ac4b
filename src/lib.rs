pub mod config;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;

use crate::services::access_service::ManageAccess;
use crate::services::attempt_service::AttemptService;
use crate::services::notification_service::AttemptEventSink;
use crate::services::quiz_service::QuizService;
use crate::store::AssessmentStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AssessmentStore>,
    pub quiz_service: QuizService,
    pub attempt_service: AttemptService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AssessmentStore>,
        access: Arc<dyn ManageAccess>,
        events: Arc<dyn AttemptEventSink>,
    ) -> Self {
        let retry_limit = crate::config::get_config().commit_retry_limit;
        let quiz_service = QuizService::new(store.clone(), access.clone(), retry_limit);
        let attempt_service = AttemptService::new(store.clone(), events, access, retry_limit);

        Self {
            store,
            quiz_service,
            attempt_service,
        }
    }
}
