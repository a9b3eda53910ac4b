use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::dto::attempt_dto::SaveAnswerRequest;
use crate::dto::quiz_dto::GradeAnswerPayload;
use crate::error::{Error, Result};
use crate::models::attempt::{Answer, AttemptStatus, ProctoringEvent, QuizAttempt};
use crate::models::quiz::{Quiz, QuizStatus};
use crate::services::access_service::{Actor, ManageAccess};
use crate::services::analytics_service;
use crate::services::grading_service::{GradeOutcome, GradingService};
use crate::services::notification_service::{AttemptEventSink, AttemptGradedEvent};
use crate::store::AssessmentStore;

/// Orchestrates the attempt lifecycle against the quiz aggregate: every
/// state change is one versioned commit, retried a bounded number of times
/// on version conflicts, with grading kept outside the commit section.
#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn AssessmentStore>,
    events: Arc<dyn AttemptEventSink>,
    access: Arc<dyn ManageAccess>,
    retry_limit: u32,
}

impl AttemptService {
    pub fn new(
        store: Arc<dyn AssessmentStore>,
        events: Arc<dyn AttemptEventSink>,
        access: Arc<dyn ManageAccess>,
        retry_limit: u32,
    ) -> Self {
        Self {
            store,
            events,
            access,
            retry_limit,
        }
    }

    /// Enforces the attempt ceiling and retake rules, then opens an
    /// in_progress attempt with the next sequential number.
    pub async fn start_attempt(
        &self,
        learner_id: Uuid,
        quiz_id: Uuid,
    ) -> Result<(QuizAttempt, Quiz)> {
        let mut retries = 0;
        loop {
            let versioned = self.store.quiz(quiz_id).await?;
            let mut quiz = versioned.record;
            if quiz.status != QuizStatus::Published {
                return Err(Error::StateConflict(format!(
                    "Quiz {} is not published",
                    quiz_id
                )));
            }

            let prior = self.store.attempts_for_learner(quiz_id, learner_id).await?;
            if prior.iter().any(|a| a.status == AttemptStatus::InProgress) {
                return Err(Error::AttemptAlreadyInProgress(format!(
                    "Learner {} already has an open attempt for quiz {}",
                    learner_id, quiz_id
                )));
            }
            if prior.len() as i32 >= quiz.settings.max_attempts {
                return Err(Error::AttemptLimitExceeded(format!(
                    "Quiz {} allows {} attempts",
                    quiz_id, quiz.settings.max_attempts
                )));
            }
            if !quiz.settings.allow_retake && prior.iter().any(|a| a.status.is_concluded()) {
                return Err(Error::RetakeNotAllowed(format!(
                    "Quiz {} does not allow retakes",
                    quiz_id
                )));
            }

            let now = Utc::now();
            let attempt = QuizAttempt::start(&quiz, learner_id, prior.len() as i32 + 1, now);

            let mut attempts = prior;
            attempts.push(attempt.clone());
            quiz.analytics = analytics_service::recompute(&quiz.questions, &attempts);
            quiz.updated_at = now;

            match self
                .store
                .commit_attempt(quiz.clone(), versioned.version, attempt.clone())
                .await
            {
                Ok(_) => {
                    tracing::info!(
                        attempt_id = %attempt.id,
                        quiz_id = %quiz_id,
                        learner_id = %learner_id,
                        attempt_number = attempt.attempt_number,
                        "attempt started"
                    );
                    return Ok((attempt, quiz));
                }
                Err(err) if err.is_retryable() && retries < self.retry_limit => {
                    retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Upsert one answer while the attempt is open. The value shape is
    /// checked against the question before anything is stored.
    pub async fn save_answer(
        &self,
        learner_id: Uuid,
        attempt_id: Uuid,
        request: SaveAnswerRequest,
    ) -> Result<DateTime<Utc>> {
        request.validate()?;
        let mut retries = 0;
        loop {
            let mut attempt = self.owned_attempt(learner_id, attempt_id).await?;
            let versioned = self.store.quiz(attempt.quiz_id).await?;
            let quiz = versioned.record;

            self.ensure_open(&attempt)?;

            let question = quiz.question(request.question_id).ok_or_else(|| {
                Error::Validation(format!(
                    "Quiz {} has no question {}",
                    quiz.id, request.question_id
                ))
            })?;
            GradingService::check_answer_shape(question, &request.answer)?;

            let now = Utc::now();
            attempt.upsert_answer(Answer {
                question_id: request.question_id,
                value: request.answer.clone(),
                is_correct: None,
                points_earned: None,
                time_spent_seconds: request.time_spent_seconds,
                answered_at: now,
            });

            match self
                .store
                .commit_attempt(quiz, versioned.version, attempt)
                .await
            {
                Ok(_) => return Ok(now),
                Err(err) if err.is_retryable() && retries < self.retry_limit => {
                    retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Learner-initiated conclusion: grades the merged answer set and
    /// commits score, question counters, and analytics in one transaction.
    pub async fn submit_attempt(
        &self,
        learner_id: Uuid,
        attempt_id: Uuid,
        answers: Vec<SaveAnswerRequest>,
    ) -> Result<(QuizAttempt, Quiz)> {
        self.conclude(attempt_id, Some(learner_id), answers, false)
            .await
    }

    /// System-initiated twin of submit: grades whatever answers exist.
    /// Safe to race a concurrent submit; the loser fails on the status
    /// check inside the commit round.
    pub async fn expire_attempt(&self, attempt_id: Uuid) -> Result<(QuizAttempt, Quiz)> {
        self.conclude(attempt_id, None, Vec::new(), true).await
    }

    /// Sweeper entry point: expire every in-progress attempt past its
    /// deadline. Losing a race to a submit is fine, not an error.
    pub async fn expire_overdue(&self) -> Result<usize> {
        let ids = self.store.overdue_attempt_ids(Utc::now()).await?;
        let mut expired = 0;
        for attempt_id in ids {
            match self.expire_attempt(attempt_id).await {
                Ok(_) => expired += 1,
                Err(Error::StateConflict(_)) => {
                    tracing::debug!(%attempt_id, "attempt concluded before expiry sweep");
                }
                Err(err) => {
                    tracing::error!(%attempt_id, error = ?err, "failed to expire attempt");
                }
            }
        }
        Ok(expired)
    }

    /// Terminal and ungraded: contributes to the abandonment rate only.
    pub async fn abandon_attempt(
        &self,
        learner_id: Uuid,
        attempt_id: Uuid,
    ) -> Result<(QuizAttempt, Quiz)> {
        let mut retries = 0;
        loop {
            let mut attempt = self.owned_attempt(learner_id, attempt_id).await?;
            let versioned = self.store.quiz(attempt.quiz_id).await?;
            let mut quiz = versioned.record;

            self.ensure_open(&attempt)?;

            let now = Utc::now();
            attempt.status = AttemptStatus::Abandoned;
            attempt.concluded_at = Some(now);
            attempt.time_spent_seconds = Some((now - attempt.started_at).num_seconds());

            let attempts = self.with_replaced(&quiz, &attempt).await?;
            quiz.analytics = analytics_service::recompute(&quiz.questions, &attempts);
            quiz.updated_at = now;

            match self
                .store
                .commit_attempt(quiz.clone(), versioned.version, attempt.clone())
                .await
            {
                Ok(_) => {
                    tracing::info!(attempt_id = %attempt.id, "attempt abandoned");
                    return Ok((attempt, quiz));
                }
                Err(err) if err.is_retryable() && retries < self.retry_limit => {
                    retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Append a suspicious-activity signal to the attempt's event log.
    pub async fn record_proctoring_event(
        &self,
        learner_id: Uuid,
        attempt_id: Uuid,
        kind: String,
        detail: Option<String>,
    ) -> Result<()> {
        let mut retries = 0;
        loop {
            let mut attempt = self.owned_attempt(learner_id, attempt_id).await?;
            let versioned = self.store.quiz(attempt.quiz_id).await?;

            self.ensure_open(&attempt)?;

            attempt.proctoring_log.push(ProctoringEvent {
                kind: kind.clone(),
                timestamp: Utc::now(),
                detail: detail.clone(),
            });

            match self
                .store
                .commit_attempt(versioned.record, versioned.version, attempt)
                .await
            {
                Ok(_) => return Ok(()),
                Err(err) if err.is_retryable() && retries < self.retry_limit => {
                    retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Reviewer supplies points for one essay/code answer. When the last
    /// pending answer is graded the attempt finalizes and flows through
    /// the same analytics and event path as an ordinary submission.
    pub async fn grade_manual_answer(
        &self,
        actor: &Actor,
        attempt_id: Uuid,
        payload: GradeAnswerPayload,
    ) -> Result<(QuizAttempt, Quiz)> {
        payload.validate()?;
        let mut retries = 0;
        loop {
            let mut attempt = self.store.attempt(attempt_id).await?;
            let versioned = self.store.quiz(attempt.quiz_id).await?;
            let mut quiz = versioned.record;

            if !self.access.can_manage(actor, &quiz) {
                return Err(Error::Policy(format!(
                    "Not allowed to grade attempts of quiz {}",
                    quiz.id
                )));
            }
            if attempt.status != AttemptStatus::AwaitingReview {
                return Err(Error::StateConflict(format!(
                    "Attempt {} is {}, not awaiting review",
                    attempt_id,
                    attempt.status.as_str()
                )));
            }

            let question = quiz.question(payload.question_id).ok_or_else(|| {
                Error::NotFound(format!(
                    "Quiz {} has no question {}",
                    quiz.id, payload.question_id
                ))
            })?;
            let outcome = GradingService::manual_grade(question, payload.points_earned)?;
            let GradeOutcome::Graded {
                is_correct,
                points_earned,
            } = outcome
            else {
                return Err(Error::Internal(
                    "Manual grading must yield points".to_string(),
                ));
            };

            let answer = attempt
                .answers
                .iter_mut()
                .find(|a| a.question_id == payload.question_id)
                .ok_or_else(|| {
                    Error::NotFound(format!(
                        "Attempt {} has no answer for question {}",
                        attempt_id, payload.question_id
                    ))
                })?;
            if answer.points_earned.is_some() {
                return Err(Error::StateConflict(format!(
                    "Answer for question {} is already graded",
                    payload.question_id
                )));
            }
            answer.is_correct = Some(is_correct);
            answer.points_earned = Some(points_earned);
            let time_spent = answer.time_spent_seconds;

            if let Some(question) = quiz.question_mut(payload.question_id) {
                question.record_outcome(is_correct, time_spent);
            }

            if attempt.ungraded_answers() == 0 {
                finalize_scores(&mut attempt, &quiz);
                attempt.status = if attempt.timed_out {
                    AttemptStatus::AutoSubmitted
                } else {
                    AttemptStatus::Submitted
                };
            }

            let attempts = self.with_replaced(&quiz, &attempt).await?;
            quiz.analytics = analytics_service::recompute(&quiz.questions, &attempts);
            quiz.updated_at = Utc::now();

            match self
                .store
                .commit_attempt(quiz.clone(), versioned.version, attempt.clone())
                .await
            {
                Ok(_) => {
                    if attempt.status.is_graded() {
                        self.emit_graded(&attempt, &quiz).await;
                    }
                    return Ok((attempt, quiz));
                }
                Err(err) if err.is_retryable() && retries < self.retry_limit => {
                    retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Attempts waiting on a reviewer, restricted to quizzes the actor
    /// may manage.
    pub async fn attempts_awaiting_review(&self, actor: &Actor) -> Result<Vec<QuizAttempt>> {
        let pending = self.store.attempts_awaiting_review().await?;
        let mut visible = Vec::new();
        for attempt in pending {
            let quiz = self.store.quiz(attempt.quiz_id).await?.record;
            if self.access.can_manage(actor, &quiz) {
                visible.push(attempt);
            }
        }
        Ok(visible)
    }

    /// Best graded attempt for a learner (highest score, latest wins a
    /// tie), for the results endpoint.
    pub async fn best_attempt(&self, learner_id: Uuid, quiz_id: Uuid) -> Result<(QuizAttempt, Quiz)> {
        let quiz = self.store.quiz(quiz_id).await?.record;
        let attempts = self.store.attempts_for_learner(quiz_id, learner_id).await?;
        let best = attempts
            .into_iter()
            .filter(|a| a.status.is_graded())
            .max_by(|a, b| {
                let score_a = a.score.unwrap_or(0.0);
                let score_b = b.score.unwrap_or(0.0);
                score_a
                    .partial_cmp(&score_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.attempt_number.cmp(&b.attempt_number))
            })
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "No submissions found for learner {} on quiz {}",
                    learner_id, quiz_id
                ))
            })?;
        Ok((best, quiz))
    }

    pub async fn attempt_with_quiz(
        &self,
        learner_id: Uuid,
        attempt_id: Uuid,
    ) -> Result<(QuizAttempt, Quiz)> {
        let attempt = self.owned_attempt(learner_id, attempt_id).await?;
        let quiz = self.store.quiz(attempt.quiz_id).await?.record;
        Ok((attempt, quiz))
    }

    async fn conclude(
        &self,
        attempt_id: Uuid,
        learner_id: Option<Uuid>,
        submitted: Vec<SaveAnswerRequest>,
        timed_out: bool,
    ) -> Result<(QuizAttempt, Quiz)> {
        let mut retries = 0;
        loop {
            let mut attempt = self.store.attempt(attempt_id).await?;
            if let Some(learner_id) = learner_id {
                if attempt.learner_id != learner_id {
                    return Err(Error::Policy(format!(
                        "Attempt {} belongs to another learner",
                        attempt_id
                    )));
                }
            }
            let versioned = self.store.quiz(attempt.quiz_id).await?;
            let mut quiz = versioned.record;

            // The status check lives inside the commit round: whichever of
            // submit/expire commits first wins, the other lands here.
            self.ensure_open(&attempt)?;
            let now = Utc::now();
            if timed_out {
                if !attempt.is_overdue(now) {
                    return Err(Error::StateConflict(format!(
                        "Attempt {} has not reached its deadline",
                        attempt_id
                    )));
                }
            } else if attempt.is_overdue(now) {
                return Err(Error::StateConflict(format!(
                    "Attempt {} is past its time limit",
                    attempt_id
                )));
            }

            for request in &submitted {
                request.validate()?;
                let question = quiz.question(request.question_id).ok_or_else(|| {
                    Error::Validation(format!(
                        "Quiz {} has no question {}",
                        quiz.id, request.question_id
                    ))
                })?;
                GradingService::check_answer_shape(question, &request.answer)?;
                attempt.upsert_answer(Answer {
                    question_id: request.question_id,
                    value: request.answer.clone(),
                    is_correct: None,
                    points_earned: None,
                    time_spent_seconds: request.time_spent_seconds,
                    answered_at: now,
                });
            }

            // Pure grading pass, off the critical section.
            let mut verdicts: Vec<(Uuid, bool, i32)> = Vec::new();
            let mut pending_review = 0usize;
            let mut kept = Vec::with_capacity(attempt.answers.len());
            for mut answer in std::mem::take(&mut attempt.answers) {
                let Some(question) = quiz.question(answer.question_id) else {
                    // The question was removed while the attempt was open.
                    tracing::warn!(
                        attempt_id = %attempt_id,
                        question_id = %answer.question_id,
                        "dropping answer for a question no longer on the quiz"
                    );
                    continue;
                };
                match GradingService::grade(question, &answer.value)? {
                    GradeOutcome::Graded {
                        is_correct,
                        points_earned,
                    } => {
                        answer.is_correct = Some(is_correct);
                        answer.points_earned = Some(points_earned);
                        verdicts.push((answer.question_id, is_correct, answer.time_spent_seconds));
                    }
                    GradeOutcome::NeedsReview => pending_review += 1,
                }
                kept.push(answer);
            }
            attempt.answers = kept;

            for (question_id, is_correct, time_spent) in &verdicts {
                if let Some(question) = quiz.question_mut(*question_id) {
                    question.record_outcome(*is_correct, *time_spent);
                }
            }

            attempt.concluded_at = Some(now);
            attempt.time_spent_seconds = Some((now - attempt.started_at).num_seconds());
            attempt.timed_out = timed_out;
            if pending_review > 0 {
                attempt.status = AttemptStatus::AwaitingReview;
            } else {
                finalize_scores(&mut attempt, &quiz);
                attempt.status = if timed_out {
                    AttemptStatus::AutoSubmitted
                } else {
                    AttemptStatus::Submitted
                };
            }

            let attempts = self.with_replaced(&quiz, &attempt).await?;
            quiz.analytics = analytics_service::recompute(&quiz.questions, &attempts);
            quiz.updated_at = now;

            match self
                .store
                .commit_attempt(quiz.clone(), versioned.version, attempt.clone())
                .await
            {
                Ok(_) => {
                    tracing::info!(
                        attempt_id = %attempt.id,
                        status = attempt.status.as_str(),
                        score = attempt.score,
                        "attempt concluded"
                    );
                    if attempt.status.is_graded() {
                        self.emit_graded(&attempt, &quiz).await;
                    }
                    return Ok((attempt, quiz));
                }
                Err(err) if err.is_retryable() && retries < self.retry_limit => {
                    retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Completion events are fire-and-forget: a sink failure is logged and
    /// never unwinds the committed grade.
    async fn emit_graded(&self, attempt: &QuizAttempt, quiz: &Quiz) {
        let event = AttemptGradedEvent::from_attempt(attempt, &quiz.title);
        if let Err(err) = self.events.on_attempt_graded(event).await {
            tracing::warn!(attempt_id = %attempt.id, error = ?err, "attempt-graded event sink failed");
        }
    }

    async fn owned_attempt(&self, learner_id: Uuid, attempt_id: Uuid) -> Result<QuizAttempt> {
        let attempt = self.store.attempt(attempt_id).await?;
        if attempt.learner_id != learner_id {
            return Err(Error::Policy(format!(
                "Attempt {} belongs to another learner",
                attempt_id
            )));
        }
        Ok(attempt)
    }

    fn ensure_open(&self, attempt: &QuizAttempt) -> Result<()> {
        if attempt.status != AttemptStatus::InProgress {
            return Err(Error::StateConflict(format!(
                "Attempt {} is {}, not in progress",
                attempt.id,
                attempt.status.as_str()
            )));
        }
        Ok(())
    }

    /// The quiz's attempt list with this attempt's new state in place of
    /// its stored one, as input for the analytics refold.
    async fn with_replaced(&self, quiz: &Quiz, attempt: &QuizAttempt) -> Result<Vec<QuizAttempt>> {
        let mut attempts = self.store.attempts_for_quiz(quiz.id).await?;
        match attempts.iter_mut().find(|a| a.id == attempt.id) {
            Some(slot) => *slot = attempt.clone(),
            None => attempts.push(attempt.clone()),
        }
        Ok(attempts)
    }
}

fn finalize_scores(attempt: &mut QuizAttempt, quiz: &Quiz) {
    let points: f64 = attempt
        .answers
        .iter()
        .filter_map(|a| a.points_earned)
        .sum();
    let score = GradingService::attempt_score(points, attempt.max_points);
    attempt.points_earned = Some(points);
    attempt.score = Some(score);
    attempt.passed = Some(score >= quiz.settings.passing_score);
}
