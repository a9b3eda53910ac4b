use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::question::{Question, QuestionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    Practice,
    Assessment,
    Final,
    Certification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResultVisibility {
    /// Score plus per-answer detail.
    Full,
    ScoreOnly,
    Hidden,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuizSettings {
    pub time_limit_minutes: Option<i32>,
    pub per_question_seconds: Option<i32>,
    pub max_attempts: i32,
    pub allow_retake: bool,
    pub passing_score: f64,
    pub shuffle_questions: bool,
    pub shuffle_options: bool,
    pub show_results: ResultVisibility,
    pub allow_backtracking: bool,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            time_limit_minutes: None,
            per_question_seconds: None,
            max_attempts: 1,
            allow_retake: false,
            passing_score: 60.0,
            shuffle_questions: false,
            shuffle_options: false,
            show_results: ResultVisibility::ScoreOnly,
            allow_backtracking: true,
        }
    }
}

impl QuizSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 1 {
            return Err(Error::Validation(
                "max_attempts must be a positive integer".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.passing_score) {
            return Err(Error::Validation(
                "passing_score must be between 0 and 100".to_string(),
            ));
        }
        if matches!(self.time_limit_minutes, Some(m) if m < 1) {
            return Err(Error::Validation(
                "time_limit_minutes must be at least 1".to_string(),
            ));
        }
        if matches!(self.per_question_seconds, Some(s) if s < 1) {
            return Err(Error::Validation(
                "per_question_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Aggregate summary over all attempts, recomputed after every conclusion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct QuizAnalytics {
    /// Every attempt ever started, regardless of outcome.
    pub total_attempts: i64,
    /// submitted + auto_submitted.
    pub graded_attempts: i64,
    pub pending_review_attempts: i64,
    pub abandoned_attempts: i64,
    pub average_score: f64,
    pub highest_score: f64,
    pub lowest_score: f64,
    pub pass_rate: f64,
    pub abandonment_rate: f64,
    pub average_duration_minutes: f64,
    pub difficulty_rating: f64,
}

/// The consistency boundary: owns its questions and analytics summary, and
/// every attempt mutation commits against this record's version.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Quiz {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub quiz_type: QuizType,
    pub status: QuizStatus,
    pub questions: Vec<Question>,
    pub settings: QuizSettings,
    /// Always the sum of question points. Never independently settable.
    pub total_points: i32,
    /// Contribution toward a course grade, consumed elsewhere.
    pub weight: f64,
    pub course_id: Option<Uuid>,
    pub lesson_id: Option<Uuid>,
    pub analytics: QuizAnalytics,
    pub published_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quiz {
    pub fn question(&self, question_id: Uuid) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn question_mut(&mut self, question_id: Uuid) -> Option<&mut Question> {
        self.questions.iter_mut().find(|q| q.id == question_id)
    }

    pub fn recompute_total_points(&mut self) {
        self.total_points = self.questions.iter().map(|q| q.points).sum();
    }

    /// Any attempt that has left in_progress pins the scoring structure.
    pub fn has_concluded_attempts(&self) -> bool {
        self.analytics.graded_attempts
            + self.analytics.pending_review_attempts
            + self.analytics.abandoned_attempts
            > 0
    }

    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;
        let mut seen = std::collections::HashSet::new();
        for question in &self.questions {
            question.validate()?;
            if !seen.insert(question.id) {
                return Err(Error::Validation(format!(
                    "Duplicate question id {}",
                    question.id
                )));
            }
        }
        Ok(())
    }

    /// Draft -> Published. The publish timestamp is set exactly once;
    /// publishing an already published quiz leaves it untouched.
    pub fn publish(&mut self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        if self.status == QuizStatus::Archived {
            return Err(Error::StateConflict(
                "Archived quizzes cannot be published".to_string(),
            ));
        }
        if self.questions.is_empty() {
            return Err(Error::Validation(
                "A quiz needs at least one question to be published".to_string(),
            ));
        }
        self.validate()?;
        self.status = QuizStatus::Published;
        Ok(*self.published_at.get_or_insert(now))
    }

    pub fn archive(&mut self) {
        self.status = QuizStatus::Archived;
    }

    /// Everything that decides a score: question identity, points, and the
    /// answer keys. Texts are free to change; this must not.
    pub fn scoring_fingerprint(&self) -> serde_json::Value {
        let questions: Vec<serde_json::Value> = self
            .questions
            .iter()
            .map(|q| {
                let key = match &q.kind {
                    QuestionKind::SingleChoice { options }
                    | QuestionKind::MultipleChoice { options } => {
                        let mut correct: Vec<String> = options
                            .iter()
                            .filter(|o| o.correct)
                            .map(|o| o.id.to_string())
                            .collect();
                        correct.sort();
                        let mut all: Vec<String> =
                            options.iter().map(|o| o.id.to_string()).collect();
                        all.sort();
                        json!({ "options": all, "correct": correct })
                    }
                    QuestionKind::TrueFalse { answer } => json!({ "answer": answer }),
                    QuestionKind::FillInBlank { accepted } => json!({ "accepted": accepted }),
                    QuestionKind::Essay { .. } => json!("manual"),
                    QuestionKind::Code { language, .. } => json!({ "language": language }),
                    QuestionKind::Matching { pairs } => {
                        json!(pairs.iter().map(|p| p.id.to_string()).collect::<Vec<_>>())
                    }
                    QuestionKind::Ordering { items } => {
                        json!(items.iter().map(|i| i.id.to_string()).collect::<Vec<_>>())
                    }
                };
                json!({
                    "id": q.id.to_string(),
                    "type": q.kind_name(),
                    "points": q.points,
                    "key": key,
                })
            })
            .collect();

        json!({
            "questions": questions,
            "passing_score": self.settings.passing_score,
            "max_attempts": self.settings.max_attempts,
            "allow_retake": self.settings.allow_retake,
            "time_limit_minutes": self.settings.time_limit_minutes,
        })
    }
}
