use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::question::{Question, QuestionKind};
use crate::models::quiz::{Quiz, QuizAnalytics, QuizSettings, QuizStatus, QuizType};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct QuestionPayload {
    /// Echo the existing id when editing; omitted ids are assigned.
    #[serde(default)]
    pub id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub text: String,
    #[validate(range(min = 1, message = "points must be positive"))]
    pub points: i32,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateQuizPayload {
    #[validate(length(min = 1))]
    pub title: String,
    pub description: Option<String>,
    pub quiz_type: QuizType,
    #[serde(default)]
    pub settings: QuizSettings,
    #[serde(default)]
    pub weight: f64,
    pub course_id: Option<Uuid>,
    pub lesson_id: Option<Uuid>,
    #[serde(default)]
    pub questions: Vec<QuestionPayload>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateQuizPayload {
    // Trim and fold empty strings to None at the boundary
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "trim_optional_string")]
    pub description: Option<String>,

    pub quiz_type: Option<QuizType>,
    pub settings: Option<QuizSettings>,
    pub weight: Option<f64>,
    pub questions: Option<Vec<QuestionPayload>>,
}

fn trim_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

/// Authoring view: includes answer keys and per-question counters.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuizResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub quiz_type: QuizType,
    pub status: QuizStatus,
    pub settings: QuizSettings,
    pub total_points: i32,
    pub weight: f64,
    pub course_id: Option<Uuid>,
    pub lesson_id: Option<Uuid>,
    pub questions: Vec<Question>,
    pub analytics: QuizAnalytics,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Quiz> for QuizResponse {
    fn from(quiz: Quiz) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title,
            description: quiz.description,
            quiz_type: quiz.quiz_type,
            status: quiz.status,
            settings: quiz.settings,
            total_points: quiz.total_points,
            weight: quiz.weight,
            course_id: quiz.course_id,
            lesson_id: quiz.lesson_id,
            questions: quiz.questions,
            analytics: quiz.analytics,
            published_at: quiz.published_at,
            created_at: quiz.created_at,
            updated_at: quiz.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PublishQuizResponse {
    pub quiz_id: Uuid,
    pub status: QuizStatus,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionStatsRow {
    pub question_id: Uuid,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub points: i32,
    pub total_attempts: i64,
    pub correct_attempts: i64,
    pub accuracy: f64,
    pub avg_response_seconds: f64,
    pub difficulty: f64,
}

impl From<&Question> for QuestionStatsRow {
    fn from(question: &Question) -> Self {
        let stats = &question.stats;
        Self {
            question_id: question.id,
            text: question.text.clone(),
            kind: question.kind_name().to_string(),
            points: question.points,
            total_attempts: stats.total_attempts,
            correct_attempts: stats.correct_attempts,
            accuracy: if stats.total_attempts > 0 {
                stats.correct_attempts as f64 / stats.total_attempts as f64
            } else {
                0.0
            },
            avg_response_seconds: stats.avg_response_seconds,
            difficulty: stats.difficulty,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuizAnalyticsResponse {
    pub quiz_id: Uuid,
    pub analytics: QuizAnalytics,
    pub questions: Vec<QuestionStatsRow>,
}

impl From<&Quiz> for QuizAnalyticsResponse {
    fn from(quiz: &Quiz) -> Self {
        Self {
            quiz_id: quiz.id,
            analytics: quiz.analytics.clone(),
            questions: quiz.questions.iter().map(QuestionStatsRow::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct GradeAnswerPayload {
    pub question_id: Uuid,
    #[validate(range(min = 0.0))]
    pub points_earned: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReviewAttemptSummary {
    pub attempt_id: Uuid,
    pub quiz_id: Uuid,
    pub learner_id: Uuid,
    pub attempt_number: i32,
    pub concluded_at: Option<DateTime<Utc>>,
    pub pending_answers: usize,
}
