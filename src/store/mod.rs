use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::attempt::QuizAttempt;
use crate::models::quiz::Quiz;

pub mod memory;

pub use memory::MemoryStore;

/// A record together with the aggregate version it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub record: T,
    pub version: u64,
}

/// Storage port for the assessment engine. The quiz record is the
/// consistency boundary: every write that touches a quiz or one of its
/// attempts is a compare-and-swap against the quiz version, and a mismatch
/// surfaces as `Error::ConcurrencyConflict` for the caller to retry.
///
/// Attempts are kept in partitioned child storage keyed by
/// (quiz_id, learner_id, attempt_number), but always commit through the
/// owning quiz's version so no two writers can interleave on one aggregate.
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn insert_quiz(&self, quiz: Quiz) -> Result<()>;

    async fn quiz(&self, quiz_id: Uuid) -> Result<Versioned<Quiz>>;

    /// CAS update of the quiz record alone. Returns the new version.
    async fn update_quiz(&self, quiz: Quiz, expected_version: u64) -> Result<u64>;

    /// CAS upsert of an attempt together with its owning quiz record, as a
    /// single commit. Returns the new version.
    async fn commit_attempt(
        &self,
        quiz: Quiz,
        expected_version: u64,
        attempt: QuizAttempt,
    ) -> Result<u64>;

    async fn attempt(&self, attempt_id: Uuid) -> Result<QuizAttempt>;

    async fn attempts_for_quiz(&self, quiz_id: Uuid) -> Result<Vec<QuizAttempt>>;

    async fn attempts_for_learner(
        &self,
        quiz_id: Uuid,
        learner_id: Uuid,
    ) -> Result<Vec<QuizAttempt>>;

    async fn attempts_awaiting_review(&self) -> Result<Vec<QuizAttempt>>;

    /// In-progress attempts whose deadline has passed, for the sweeper.
    async fn overdue_attempt_ids(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>>;
}
