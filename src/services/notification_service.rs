use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::attempt::{AttemptStatus, QuizAttempt};

/// Payload handed to the notification collaborator when an attempt
/// finishes grading.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptGradedEvent {
    pub attempt_id: Uuid,
    pub quiz_id: Uuid,
    pub quiz_title: String,
    pub learner_id: Uuid,
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub score: f64,
    pub passed: bool,
    pub concluded_at: Option<DateTime<Utc>>,
}

impl AttemptGradedEvent {
    pub fn from_attempt(attempt: &QuizAttempt, quiz_title: &str) -> Self {
        Self {
            attempt_id: attempt.id,
            quiz_id: attempt.quiz_id,
            quiz_title: quiz_title.to_string(),
            learner_id: attempt.learner_id,
            attempt_number: attempt.attempt_number,
            status: attempt.status,
            score: attempt.score.unwrap_or(0.0),
            passed: attempt.passed.unwrap_or(false),
            concluded_at: attempt.concluded_at,
        }
    }
}

/// Fire-and-forget event sink. Delivery failures are the sink's problem;
/// they must never roll back a committed grade.
#[async_trait]
pub trait AttemptEventSink: Send + Sync {
    async fn on_attempt_graded(&self, event: AttemptGradedEvent) -> anyhow::Result<()>;
}

/// Default sink: structured log line, picked up by whatever ships logs.
pub struct LogEventSink;

#[async_trait]
impl AttemptEventSink for LogEventSink {
    async fn on_attempt_graded(&self, event: AttemptGradedEvent) -> anyhow::Result<()> {
        tracing::info!(
            attempt_id = %event.attempt_id,
            quiz_id = %event.quiz_id,
            learner_id = %event.learner_id,
            score = event.score,
            passed = event.passed,
            status = event.status.as_str(),
            "attempt graded"
        );
        Ok(())
    }
}

/// Buffers events in memory. Used by tests to assert emission.
#[derive(Default)]
pub struct RecordingEventSink {
    events: std::sync::Mutex<Vec<AttemptGradedEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AttemptGradedEvent> {
        self.events
            .lock()
            .expect("event sink mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl AttemptEventSink for RecordingEventSink {
    async fn on_attempt_graded(&self, event: AttemptGradedEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .expect("event sink mutex poisoned")
            .push(event);
        Ok(())
    }
}
