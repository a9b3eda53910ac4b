use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One gradable unit of a quiz. The kind carries exactly the answer-key
/// representation valid for its type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Question {
    pub id: Uuid,
    pub text: String,
    pub points: i32,
    pub order_index: i32,
    #[serde(flatten)]
    pub kind: QuestionKind,
    #[serde(default)]
    pub stats: QuestionStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice {
        options: Vec<ChoiceOption>,
    },
    MultipleChoice {
        options: Vec<ChoiceOption>,
    },
    TrueFalse {
        answer: bool,
    },
    FillInBlank {
        accepted: Vec<String>,
    },
    Essay {
        guidelines: Option<String>,
    },
    Code {
        language: String,
        reference_solution: String,
        #[serde(default)]
        test_cases: Vec<CodeTestCase>,
    },
    Matching {
        pairs: Vec<MatchingPair>,
    },
    Ordering {
        items: Vec<OrderingItem>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChoiceOption {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub text: String,
    #[serde(default)]
    pub correct: bool,
    #[serde(default)]
    pub order_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CodeTestCase {
    pub input: String,
    pub expected: String,
}

/// The stored pair order defines the correct association: each prompt
/// belongs with its own pair's answer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MatchingPair {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub prompt: String,
    pub answer: String,
}

/// The stored item order is the correct sequence.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderingItem {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub text: String,
}

/// Rolling per-question counters, folded in atomically with attempt grading.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct QuestionStats {
    pub total_attempts: i64,
    pub correct_attempts: i64,
    pub avg_response_seconds: f64,
    pub difficulty: f64,
}

impl Question {
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            QuestionKind::SingleChoice { .. } => "single_choice",
            QuestionKind::MultipleChoice { .. } => "multiple_choice",
            QuestionKind::TrueFalse { .. } => "true_false",
            QuestionKind::FillInBlank { .. } => "fill_in_blank",
            QuestionKind::Essay { .. } => "essay",
            QuestionKind::Code { .. } => "code",
            QuestionKind::Matching { .. } => "matching",
            QuestionKind::Ordering { .. } => "ordering",
        }
    }

    /// Essay and code answers are scored by a reviewer, not the engine.
    pub fn needs_manual_grading(&self) -> bool {
        matches!(
            self.kind,
            QuestionKind::Essay { .. } | QuestionKind::Code { .. }
        )
    }

    /// Well-formedness of the question shape and its answer key. Called on
    /// quiz create/update and again at publish.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::Validation(format!(
                "Question {} has empty text",
                self.id
            )));
        }
        if self.points <= 0 {
            return Err(Error::Validation(format!(
                "Question {} must be worth a positive number of points",
                self.id
            )));
        }

        match &self.kind {
            QuestionKind::SingleChoice { options } | QuestionKind::MultipleChoice { options } => {
                if options.len() < 2 {
                    return Err(Error::Validation(format!(
                        "Choice question {} needs at least 2 options",
                        self.id
                    )));
                }
                let correct = options.iter().filter(|o| o.correct).count();
                if correct == 0 {
                    return Err(Error::Validation(format!(
                        "Choice question {} needs at least 1 correct option",
                        self.id
                    )));
                }
                if matches!(self.kind, QuestionKind::SingleChoice { .. }) && correct != 1 {
                    return Err(Error::Validation(format!(
                        "Single-choice question {} must have exactly 1 correct option",
                        self.id
                    )));
                }
                if !has_unique_ids(options.iter().map(|o| o.id)) {
                    return Err(Error::Validation(format!(
                        "Choice question {} has duplicate option ids",
                        self.id
                    )));
                }
            }
            QuestionKind::TrueFalse { .. } => {}
            QuestionKind::FillInBlank { accepted } => {
                if accepted.iter().all(|a| a.trim().is_empty()) {
                    return Err(Error::Validation(format!(
                        "Fill-in-blank question {} needs at least 1 accepted answer",
                        self.id
                    )));
                }
            }
            QuestionKind::Essay { .. } => {}
            QuestionKind::Code { language, .. } => {
                if language.trim().is_empty() {
                    return Err(Error::Validation(format!(
                        "Code question {} is missing a language",
                        self.id
                    )));
                }
            }
            QuestionKind::Matching { pairs } => {
                if pairs.len() < 2 {
                    return Err(Error::Validation(format!(
                        "Matching question {} needs at least 2 pairs",
                        self.id
                    )));
                }
                if !has_unique_ids(pairs.iter().map(|p| p.id)) {
                    return Err(Error::Validation(format!(
                        "Matching question {} has duplicate pair ids",
                        self.id
                    )));
                }
            }
            QuestionKind::Ordering { items } => {
                if items.len() < 2 {
                    return Err(Error::Validation(format!(
                        "Ordering question {} needs at least 2 items",
                        self.id
                    )));
                }
                if !has_unique_ids(items.iter().map(|i| i.id)) {
                    return Err(Error::Validation(format!(
                        "Ordering question {} has duplicate item ids",
                        self.id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Fold one graded answer into the rolling counters.
    pub fn record_outcome(&mut self, is_correct: bool, time_spent_seconds: i32) {
        let stats = &mut self.stats;
        stats.total_attempts += 1;
        if is_correct {
            stats.correct_attempts += 1;
        }
        let n = stats.total_attempts as f64;
        stats.avg_response_seconds += (time_spent_seconds as f64 - stats.avg_response_seconds) / n;
        stats.difficulty = 1.0 - stats.correct_attempts as f64 / n;
    }
}

fn has_unique_ids(ids: impl Iterator<Item = Uuid>) -> bool {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().all(|id| seen.insert(id))
}
