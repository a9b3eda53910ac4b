use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::quiz::Quiz;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    /// Concluded, but one or more essay/code answers still need a reviewer.
    AwaitingReview,
    Submitted,
    AutoSubmitted,
    Abandoned,
}

impl AttemptStatus {
    /// All non-initial states are terminal for the learner.
    pub fn is_concluded(&self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }

    /// States that contribute to score analytics.
    pub fn is_graded(&self) -> bool {
        matches!(self, AttemptStatus::Submitted | AttemptStatus::AutoSubmitted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::AwaitingReview => "awaiting_review",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::AutoSubmitted => "auto_submitted",
            AttemptStatus::Abandoned => "abandoned",
        }
    }
}

/// What the learner actually sent for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerValue {
    Selection { option_ids: Vec<Uuid> },
    Boolean { value: bool },
    Text { text: String },
    CodeSubmission { language: String, source: String },
    Matching { pairings: Vec<MatchPairing> },
    Ordering { sequence: Vec<Uuid> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MatchPairing {
    pub prompt_id: Uuid,
    pub answer_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Answer {
    pub question_id: Uuid,
    pub value: AnswerValue,
    /// Derived by grading; stays None for essay/code until review.
    pub is_correct: Option<bool>,
    pub points_earned: Option<f64>,
    pub time_spent_seconds: i32,
    pub answered_at: DateTime<Utc>,
}

/// Suspicious-activity signal recorded while an attempt is in progress.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProctoringEvent {
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub detail: Option<String>,
}

/// One learner's timed session against a quiz. Keyed in storage by
/// (quiz_id, learner_id, attempt_number).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuizAttempt {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub learner_id: Uuid,
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub answers: Vec<Answer>,
    /// 0-100, rounded. Set when the attempt finalizes.
    pub score: Option<f64>,
    pub points_earned: Option<f64>,
    pub max_points: i32,
    pub passed: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub concluded_at: Option<DateTime<Utc>>,
    pub time_spent_seconds: Option<i64>,
    /// Whether the attempt was concluded by the expiry sweeper rather than
    /// the learner. Decides submitted vs auto_submitted after review.
    pub timed_out: bool,
    #[serde(default)]
    pub proctoring_log: Vec<ProctoringEvent>,
}

impl QuizAttempt {
    pub fn start(quiz: &Quiz, learner_id: Uuid, attempt_number: i32, now: DateTime<Utc>) -> Self {
        let deadline = quiz
            .settings
            .time_limit_minutes
            .map(|minutes| now + chrono::Duration::minutes(minutes as i64));
        Self {
            id: Uuid::new_v4(),
            quiz_id: quiz.id,
            learner_id,
            attempt_number,
            status: AttemptStatus::InProgress,
            answers: Vec::new(),
            score: None,
            points_earned: None,
            max_points: quiz.total_points,
            passed: None,
            started_at: now,
            deadline,
            concluded_at: None,
            time_spent_seconds: None,
            timed_out: false,
            proctoring_log: Vec::new(),
        }
    }

    pub fn answer_for(&self, question_id: Uuid) -> Option<&Answer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }

    /// Insert or replace the answer for its question.
    pub fn upsert_answer(&mut self, answer: Answer) {
        match self
            .answers
            .iter_mut()
            .find(|a| a.question_id == answer.question_id)
        {
            Some(slot) => *slot = answer,
            None => self.answers.push(answer),
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == AttemptStatus::InProgress
            && self.deadline.map(|d| d <= now).unwrap_or(false)
    }

    /// Answers still waiting for a reviewer's points.
    pub fn ungraded_answers(&self) -> usize {
        self.answers
            .iter()
            .filter(|a| a.points_earned.is_none())
            .count()
    }
}
