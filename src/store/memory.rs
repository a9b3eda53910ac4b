use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::attempt::{AttemptStatus, QuizAttempt};
use crate::models::quiz::Quiz;
use crate::store::{AssessmentStore, Versioned};

/// (quiz_id, learner_id, attempt_number)
type AttemptKey = (Uuid, Uuid, i32);

#[derive(Default)]
struct Inner {
    quizzes: HashMap<Uuid, Versioned<Quiz>>,
    attempts: BTreeMap<AttemptKey, QuizAttempt>,
    attempt_index: HashMap<Uuid, AttemptKey>,
}

/// In-memory store. The single mutex trivially serializes commits; the
/// version check is still enforced so the optimistic-concurrency contract
/// behaves exactly like a real backend would.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn attempt_key(attempt: &QuizAttempt) -> AttemptKey {
    (attempt.quiz_id, attempt.learner_id, attempt.attempt_number)
}

#[async_trait]
impl AssessmentStore for MemoryStore {
    async fn insert_quiz(&self, quiz: Quiz) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store mutex poisoned");
        if inner.quizzes.contains_key(&quiz.id) {
            return Err(Error::Internal(format!("Quiz {} already exists", quiz.id)));
        }
        inner.quizzes.insert(
            quiz.id,
            Versioned {
                record: quiz,
                version: 1,
            },
        );
        Ok(())
    }

    async fn quiz(&self, quiz_id: Uuid) -> Result<Versioned<Quiz>> {
        let inner = self.inner.lock().expect("memory store mutex poisoned");
        inner
            .quizzes
            .get(&quiz_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Quiz {} not found", quiz_id)))
    }

    async fn update_quiz(&self, quiz: Quiz, expected_version: u64) -> Result<u64> {
        let mut inner = self.inner.lock().expect("memory store mutex poisoned");
        let slot = inner
            .quizzes
            .get_mut(&quiz.id)
            .ok_or_else(|| Error::NotFound(format!("Quiz {} not found", quiz.id)))?;
        if slot.version != expected_version {
            return Err(Error::ConcurrencyConflict(format!(
                "Quiz {} is at version {}, expected {}",
                quiz.id, slot.version, expected_version
            )));
        }
        slot.record = quiz;
        slot.version += 1;
        Ok(slot.version)
    }

    async fn commit_attempt(
        &self,
        quiz: Quiz,
        expected_version: u64,
        attempt: QuizAttempt,
    ) -> Result<u64> {
        let mut inner = self.inner.lock().expect("memory store mutex poisoned");
        let slot = inner
            .quizzes
            .get_mut(&quiz.id)
            .ok_or_else(|| Error::NotFound(format!("Quiz {} not found", quiz.id)))?;
        if slot.version != expected_version {
            return Err(Error::ConcurrencyConflict(format!(
                "Quiz {} is at version {}, expected {}",
                quiz.id, slot.version, expected_version
            )));
        }
        slot.record = quiz;
        slot.version += 1;
        let version = slot.version;

        let key = attempt_key(&attempt);
        inner.attempt_index.insert(attempt.id, key);
        inner.attempts.insert(key, attempt);
        Ok(version)
    }

    async fn attempt(&self, attempt_id: Uuid) -> Result<QuizAttempt> {
        let inner = self.inner.lock().expect("memory store mutex poisoned");
        inner
            .attempt_index
            .get(&attempt_id)
            .and_then(|key| inner.attempts.get(key))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))
    }

    async fn attempts_for_quiz(&self, quiz_id: Uuid) -> Result<Vec<QuizAttempt>> {
        let inner = self.inner.lock().expect("memory store mutex poisoned");
        Ok(inner
            .attempts
            .range((quiz_id, Uuid::nil(), 0)..=(quiz_id, Uuid::max(), i32::MAX))
            .map(|(_, attempt)| attempt.clone())
            .collect())
    }

    async fn attempts_for_learner(
        &self,
        quiz_id: Uuid,
        learner_id: Uuid,
    ) -> Result<Vec<QuizAttempt>> {
        let inner = self.inner.lock().expect("memory store mutex poisoned");
        Ok(inner
            .attempts
            .range((quiz_id, learner_id, 0)..=(quiz_id, learner_id, i32::MAX))
            .map(|(_, attempt)| attempt.clone())
            .collect())
    }

    async fn attempts_awaiting_review(&self) -> Result<Vec<QuizAttempt>> {
        let inner = self.inner.lock().expect("memory store mutex poisoned");
        Ok(inner
            .attempts
            .values()
            .filter(|a| a.status == AttemptStatus::AwaitingReview)
            .cloned()
            .collect())
    }

    async fn overdue_attempt_ids(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let inner = self.inner.lock().expect("memory store mutex poisoned");
        Ok(inner
            .attempts
            .values()
            .filter(|a| a.is_overdue(now))
            .map(|a| a.id)
            .collect())
    }
}
