use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::attempt::{AnswerValue, AttemptStatus, QuizAttempt};
use crate::models::question::{Question, QuestionKind};
use crate::models::quiz::{Quiz, ResultVisibility};

/// A question as the learner sees it: no correctness flags, no keys.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LearnerQuestion {
    pub id: Uuid,
    pub text: String,
    pub points: i32,
    #[serde(flatten)]
    pub kind: LearnerQuestionKind,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LearnerQuestionKind {
    SingleChoice {
        options: Vec<LearnerOption>,
    },
    MultipleChoice {
        options: Vec<LearnerOption>,
    },
    TrueFalse,
    FillInBlank,
    Essay {
        guidelines: Option<String>,
    },
    Code {
        language: String,
    },
    Matching {
        prompts: Vec<LearnerOption>,
        answers: Vec<LearnerOption>,
    },
    Ordering {
        items: Vec<LearnerOption>,
    },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LearnerOption {
    pub id: Uuid,
    pub text: String,
}

/// Strip keys and apply the quiz's shuffle settings. Matching answers and
/// ordering items are always shuffled, otherwise the stored order would
/// spell out the key.
pub fn learner_questions(quiz: &Quiz) -> Vec<LearnerQuestion> {
    let mut rng = rand::thread_rng();
    let mut questions: Vec<&Question> = quiz.questions.iter().collect();
    if quiz.settings.shuffle_questions {
        questions.shuffle(&mut rng);
    }

    questions
        .into_iter()
        .map(|question| {
            let kind = match &question.kind {
                QuestionKind::SingleChoice { options } => LearnerQuestionKind::SingleChoice {
                    options: learner_options(options, quiz.settings.shuffle_options, &mut rng),
                },
                QuestionKind::MultipleChoice { options } => LearnerQuestionKind::MultipleChoice {
                    options: learner_options(options, quiz.settings.shuffle_options, &mut rng),
                },
                QuestionKind::TrueFalse { .. } => LearnerQuestionKind::TrueFalse,
                QuestionKind::FillInBlank { .. } => LearnerQuestionKind::FillInBlank,
                QuestionKind::Essay { guidelines } => LearnerQuestionKind::Essay {
                    guidelines: guidelines.clone(),
                },
                QuestionKind::Code { language, .. } => LearnerQuestionKind::Code {
                    language: language.clone(),
                },
                QuestionKind::Matching { pairs } => {
                    let prompts = pairs
                        .iter()
                        .map(|p| LearnerOption {
                            id: p.id,
                            text: p.prompt.clone(),
                        })
                        .collect();
                    let mut answers: Vec<LearnerOption> = pairs
                        .iter()
                        .map(|p| LearnerOption {
                            id: p.id,
                            text: p.answer.clone(),
                        })
                        .collect();
                    answers.shuffle(&mut rng);
                    LearnerQuestionKind::Matching { prompts, answers }
                }
                QuestionKind::Ordering { items } => {
                    let mut items: Vec<LearnerOption> = items
                        .iter()
                        .map(|i| LearnerOption {
                            id: i.id,
                            text: i.text.clone(),
                        })
                        .collect();
                    items.shuffle(&mut rng);
                    LearnerQuestionKind::Ordering { items }
                }
            };
            LearnerQuestion {
                id: question.id,
                text: question.text.clone(),
                points: question.points,
                kind,
            }
        })
        .collect()
}

fn learner_options(
    options: &[crate::models::question::ChoiceOption],
    shuffle: bool,
    rng: &mut impl rand::Rng,
) -> Vec<LearnerOption> {
    let mut out: Vec<LearnerOption> = options
        .iter()
        .map(|o| LearnerOption {
            id: o.id,
            text: o.text.clone(),
        })
        .collect();
    if shuffle {
        out.shuffle(rng);
    }
    out
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StartAttemptResponse {
    pub attempt_id: Uuid,
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub per_question_seconds: Option<i32>,
    pub allow_backtracking: bool,
    pub questions: Vec<LearnerQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SaveAnswerRequest {
    pub question_id: Uuid,
    pub answer: AnswerValue,
    #[validate(range(min = 0))]
    pub time_spent_seconds: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SaveAnswerResponse {
    pub saved: bool,
    pub question_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitAttemptRequest {
    pub answers: Vec<SaveAnswerRequest>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerDetail {
    pub question_id: Uuid,
    pub is_correct: Option<bool>,
    pub points_earned: Option<f64>,
    pub max_points: i32,
}

/// Attempt outcome with detail gated by the quiz's result-visibility
/// policy. Also serves as the submit response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttemptResultResponse {
    pub attempt_id: Uuid,
    pub quiz_id: Uuid,
    pub learner_id: Uuid,
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub concluded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_earned: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_points: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    pub pending_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<AnswerDetail>>,
}

impl AttemptResultResponse {
    /// Learner view, honoring the quiz's result-visibility policy.
    pub fn build(attempt: &QuizAttempt, quiz: &Quiz) -> Self {
        Self::with_visibility(attempt, quiz, quiz.settings.show_results)
    }

    /// Reviewer view: always full detail.
    pub fn unrestricted(attempt: &QuizAttempt, quiz: &Quiz) -> Self {
        Self::with_visibility(attempt, quiz, ResultVisibility::Full)
    }

    fn with_visibility(attempt: &QuizAttempt, quiz: &Quiz, visibility: ResultVisibility) -> Self {
        let show_score = !matches!(visibility, ResultVisibility::Hidden);
        let answers = match visibility {
            ResultVisibility::Full => Some(
                attempt
                    .answers
                    .iter()
                    .map(|a| AnswerDetail {
                        question_id: a.question_id,
                        is_correct: a.is_correct,
                        points_earned: a.points_earned,
                        max_points: quiz
                            .question(a.question_id)
                            .map(|q| q.points)
                            .unwrap_or(0),
                    })
                    .collect(),
            ),
            ResultVisibility::ScoreOnly | ResultVisibility::Hidden => None,
        };

        Self {
            attempt_id: attempt.id,
            quiz_id: attempt.quiz_id,
            learner_id: attempt.learner_id,
            attempt_number: attempt.attempt_number,
            status: attempt.status,
            concluded_at: attempt.concluded_at,
            score: if show_score { attempt.score } else { None },
            points_earned: if show_score { attempt.points_earned } else { None },
            max_points: if show_score { Some(attempt.max_points) } else { None },
            passed: if show_score { attempt.passed } else { None },
            pending_review: attempt.status == AttemptStatus::AwaitingReview,
            answers,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttemptStatusResponse {
    pub attempt_id: Uuid,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub time_remaining_seconds: Option<i64>,
    pub questions_answered: usize,
    pub total_questions: usize,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ProctoringEventRequest {
    #[validate(length(min = 1))]
    pub kind: String,
    pub detail: Option<String>,
}
