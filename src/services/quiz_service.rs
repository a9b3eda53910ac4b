use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::dto::quiz_dto::{CreateQuizPayload, QuestionPayload, UpdateQuizPayload};
use crate::error::{Error, Result};
use crate::models::question::{Question, QuestionStats};
use crate::models::quiz::{Quiz, QuizStatus};
use crate::services::access_service::{Actor, ManageAccess};
use crate::store::AssessmentStore;

#[derive(Clone)]
pub struct QuizService {
    store: Arc<dyn AssessmentStore>,
    access: Arc<dyn ManageAccess>,
    retry_limit: u32,
}

impl QuizService {
    pub fn new(
        store: Arc<dyn AssessmentStore>,
        access: Arc<dyn ManageAccess>,
        retry_limit: u32,
    ) -> Self {
        Self {
            store,
            access,
            retry_limit,
        }
    }

    pub async fn create_quiz(&self, actor: &Actor, payload: CreateQuizPayload) -> Result<Quiz> {
        payload.validate()?;
        let now = Utc::now();
        let questions = build_questions(payload.questions)?;

        let mut quiz = Quiz {
            id: Uuid::new_v4(),
            title: payload.title,
            description: payload.description,
            quiz_type: payload.quiz_type,
            status: QuizStatus::Draft,
            questions,
            settings: payload.settings,
            total_points: 0,
            weight: payload.weight,
            course_id: payload.course_id,
            lesson_id: payload.lesson_id,
            analytics: Default::default(),
            published_at: None,
            created_by: actor.id,
            created_at: now,
            updated_at: now,
        };
        quiz.recompute_total_points();
        quiz.validate()?;

        if !self.access.can_manage(actor, &quiz) {
            return Err(Error::Policy("Not allowed to create quizzes".to_string()));
        }

        self.store.insert_quiz(quiz.clone()).await?;
        tracing::info!(quiz_id = %quiz.id, title = %quiz.title, "quiz created");
        Ok(quiz)
    }

    pub async fn get_quiz(&self, actor: &Actor, quiz_id: Uuid) -> Result<Quiz> {
        let versioned = self.store.quiz(quiz_id).await?;
        self.authorize(actor, &versioned.record)?;
        Ok(versioned.record)
    }

    pub async fn update_quiz(
        &self,
        actor: &Actor,
        quiz_id: Uuid,
        payload: UpdateQuizPayload,
    ) -> Result<Quiz> {
        payload.validate()?;
        let mut retries = 0;
        loop {
            let versioned = self.store.quiz(quiz_id).await?;
            let quiz = versioned.record;
            self.authorize(actor, &quiz)?;

            let candidate = apply_update(&quiz, payload.clone())?;
            match self.store.update_quiz(candidate.clone(), versioned.version).await {
                Ok(_) => {
                    tracing::info!(quiz_id = %quiz_id, "quiz updated");
                    return Ok(candidate);
                }
                Err(err) if err.is_retryable() && retries < self.retry_limit => {
                    retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Draft -> Published. Returns the publish timestamp, which is set at
    /// most once no matter how often this is called.
    pub async fn publish_quiz(
        &self,
        actor: &Actor,
        quiz_id: Uuid,
    ) -> Result<(Quiz, DateTime<Utc>)> {
        let mut retries = 0;
        loop {
            let versioned = self.store.quiz(quiz_id).await?;
            let mut quiz = versioned.record;
            self.authorize(actor, &quiz)?;

            let published_at = quiz.publish(Utc::now())?;
            quiz.updated_at = Utc::now();
            match self.store.update_quiz(quiz.clone(), versioned.version).await {
                Ok(_) => {
                    tracing::info!(quiz_id = %quiz_id, %published_at, "quiz published");
                    return Ok((quiz, published_at));
                }
                Err(err) if err.is_retryable() && retries < self.retry_limit => {
                    retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn archive_quiz(&self, actor: &Actor, quiz_id: Uuid) -> Result<Quiz> {
        let mut retries = 0;
        loop {
            let versioned = self.store.quiz(quiz_id).await?;
            let mut quiz = versioned.record;
            self.authorize(actor, &quiz)?;

            quiz.archive();
            quiz.updated_at = Utc::now();
            match self.store.update_quiz(quiz.clone(), versioned.version).await {
                Ok(_) => {
                    tracing::info!(quiz_id = %quiz_id, "quiz archived");
                    return Ok(quiz);
                }
                Err(err) if err.is_retryable() && retries < self.retry_limit => {
                    retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn quiz_analytics(&self, actor: &Actor, quiz_id: Uuid) -> Result<Quiz> {
        self.get_quiz(actor, quiz_id).await
    }

    fn authorize(&self, actor: &Actor, quiz: &Quiz) -> Result<()> {
        if self.access.can_manage(actor, quiz) {
            Ok(())
        } else {
            Err(Error::Policy(format!(
                "Not allowed to manage quiz {}",
                quiz.id
            )))
        }
    }
}

fn build_questions(payloads: Vec<QuestionPayload>) -> Result<Vec<Question>> {
    payloads
        .into_iter()
        .enumerate()
        .map(|(idx, payload)| {
            payload.validate()?;
            let question = Question {
                id: payload.id.unwrap_or_else(Uuid::new_v4),
                text: payload.text,
                points: payload.points,
                order_index: idx as i32,
                kind: payload.kind,
                stats: QuestionStats::default(),
            };
            question.validate()?;
            Ok(question)
        })
        .collect()
}

/// Merge an update into the quiz, enforcing the edit policy: once any
/// attempt has concluded, text edits are fine but anything that decides a
/// score (question set, points, keys, scoring settings) is frozen.
fn apply_update(quiz: &Quiz, payload: UpdateQuizPayload) -> Result<Quiz> {
    let mut candidate = quiz.clone();

    if let Some(title) = payload.title {
        candidate.title = title;
    }
    if let Some(description) = payload.description {
        candidate.description = Some(description);
    }
    if let Some(quiz_type) = payload.quiz_type {
        candidate.quiz_type = quiz_type;
    }
    if let Some(weight) = payload.weight {
        candidate.weight = weight;
    }
    if let Some(settings) = payload.settings {
        candidate.settings = settings;
    }
    if let Some(questions) = payload.questions {
        let rebuilt = build_questions(questions)?;
        // Carry rolling counters across edits of the same question.
        candidate.questions = rebuilt
            .into_iter()
            .map(|mut question| {
                if let Some(existing) = quiz.question(question.id) {
                    question.stats = existing.stats.clone();
                }
                question
            })
            .collect();
    }

    candidate.recompute_total_points();
    candidate.validate()?;

    if quiz.has_concluded_attempts()
        && candidate.scoring_fingerprint() != quiz.scoring_fingerprint()
    {
        return Err(Error::StateConflict(
            "Quiz already has concluded attempts; scoring-relevant fields are frozen. \
             Create a new quiz revision instead."
                .to_string(),
        ));
    }

    candidate.updated_at = Utc::now();
    Ok(candidate)
}
