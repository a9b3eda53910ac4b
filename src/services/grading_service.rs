use std::collections::HashSet;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::attempt::AnswerValue;
use crate::models::question::{Question, QuestionKind};

/// Fraction of a manually graded question's points that counts as correct.
pub const MANUAL_PASS_RATIO: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradeOutcome {
    Graded { is_correct: bool, points_earned: f64 },
    /// Essay/code: a reviewer supplies the points later.
    NeedsReview,
}

/// Pure, deterministic grading. No I/O, no mutation: the assessment
/// service folds the outcomes into question counters inside the same
/// aggregate commit as the attempt's score.
pub struct GradingService;

impl GradingService {
    /// Rejects a submitted value whose shape does not fit the question
    /// before anything is mutated. Unknown option/pair/item ids are
    /// malformed input, not wrong answers.
    pub fn check_answer_shape(question: &Question, value: &AnswerValue) -> Result<()> {
        match (&question.kind, value) {
            (QuestionKind::SingleChoice { options }, AnswerValue::Selection { option_ids }) => {
                if option_ids.len() != 1 {
                    return Err(Error::Validation(format!(
                        "Question {} takes exactly one selected option",
                        question.id
                    )));
                }
                check_known_ids(question, option_ids, options.iter().map(|o| o.id))
            }
            (QuestionKind::MultipleChoice { options }, AnswerValue::Selection { option_ids }) => {
                if !all_unique(option_ids) {
                    return Err(Error::Validation(format!(
                        "Question {} has duplicate selected options",
                        question.id
                    )));
                }
                check_known_ids(question, option_ids, options.iter().map(|o| o.id))
            }
            (QuestionKind::TrueFalse { .. }, AnswerValue::Boolean { .. }) => Ok(()),
            (QuestionKind::FillInBlank { .. }, AnswerValue::Text { .. }) => Ok(()),
            (QuestionKind::Essay { .. }, AnswerValue::Text { .. }) => Ok(()),
            (QuestionKind::Code { .. }, AnswerValue::CodeSubmission { .. }) => Ok(()),
            (QuestionKind::Matching { pairs }, AnswerValue::Matching { pairings }) => {
                if !all_unique(&pairings.iter().map(|p| p.prompt_id).collect::<Vec<_>>()) {
                    return Err(Error::Validation(format!(
                        "Question {} has a prompt matched twice",
                        question.id
                    )));
                }
                let known: HashSet<Uuid> = pairs.iter().map(|p| p.id).collect();
                for pairing in pairings {
                    if !known.contains(&pairing.prompt_id) || !known.contains(&pairing.answer_id) {
                        return Err(Error::Validation(format!(
                            "Question {} got a pairing with an unknown id",
                            question.id
                        )));
                    }
                }
                Ok(())
            }
            (QuestionKind::Ordering { items }, AnswerValue::Ordering { sequence }) => {
                if !all_unique(sequence) {
                    return Err(Error::Validation(format!(
                        "Question {} has a duplicated item in the sequence",
                        question.id
                    )));
                }
                check_known_ids(question, sequence, items.iter().map(|i| i.id))
            }
            _ => Err(Error::Validation(format!(
                "Answer value does not match {} question {}",
                question.kind_name(),
                question.id
            ))),
        }
    }

    /// `(question, submitted value) -> outcome`. Exact-match policy for
    /// every auto-gradable kind: full points or zero, no partial credit
    /// (matching/ordering included, deliberately).
    pub fn grade(question: &Question, value: &AnswerValue) -> Result<GradeOutcome> {
        Self::check_answer_shape(question, value)?;

        let correct = match (&question.kind, value) {
            (
                QuestionKind::SingleChoice { options } | QuestionKind::MultipleChoice { options },
                AnswerValue::Selection { option_ids },
            ) => {
                let key: HashSet<Uuid> =
                    options.iter().filter(|o| o.correct).map(|o| o.id).collect();
                if key.is_empty() {
                    return Err(Error::DataIntegrity(format!(
                        "Question {} has no correct option in its key",
                        question.id
                    )));
                }
                let submitted: HashSet<Uuid> = option_ids.iter().copied().collect();
                submitted == key
            }
            (QuestionKind::TrueFalse { answer }, AnswerValue::Boolean { value }) => value == answer,
            (QuestionKind::FillInBlank { accepted }, AnswerValue::Text { text }) => {
                let normalized: Vec<String> = accepted
                    .iter()
                    .map(|a| normalize_text(a))
                    .filter(|a| !a.is_empty())
                    .collect();
                if normalized.is_empty() {
                    return Err(Error::DataIntegrity(format!(
                        "Question {} has an empty accepted-answer key",
                        question.id
                    )));
                }
                normalized.contains(&normalize_text(text))
            }
            (QuestionKind::Essay { .. }, _) | (QuestionKind::Code { .. }, _) => {
                return Ok(GradeOutcome::NeedsReview);
            }
            (QuestionKind::Matching { pairs }, AnswerValue::Matching { pairings }) => {
                pairings.len() == pairs.len()
                    && pairings.iter().all(|p| p.prompt_id == p.answer_id)
            }
            (QuestionKind::Ordering { items }, AnswerValue::Ordering { sequence }) => {
                sequence.len() == items.len()
                    && sequence
                        .iter()
                        .zip(items.iter())
                        .all(|(submitted, item)| *submitted == item.id)
            }
            // check_answer_shape already rejected everything else.
            _ => {
                return Err(Error::Validation(format!(
                    "Answer value does not match {} question {}",
                    question.kind_name(),
                    question.id
                )));
            }
        };

        Ok(GradeOutcome::Graded {
            is_correct: correct,
            points_earned: if correct { question.points as f64 } else { 0.0 },
        })
    }

    /// Reviewer-supplied points for an essay/code answer. Correctness is
    /// derived from the fixed threshold, never from content.
    pub fn manual_grade(question: &Question, points_earned: f64) -> Result<GradeOutcome> {
        if !question.needs_manual_grading() {
            return Err(Error::StateConflict(format!(
                "Question {} is auto-graded and cannot be manually scored",
                question.id
            )));
        }
        if !(0.0..=question.points as f64).contains(&points_earned) {
            return Err(Error::Validation(format!(
                "points_earned must be between 0 and {}",
                question.points
            )));
        }
        Ok(GradeOutcome::Graded {
            is_correct: points_earned >= MANUAL_PASS_RATIO * question.points as f64,
            points_earned,
        })
    }

    /// `round(points / total * 100)`, 0 when the quiz carries no points.
    pub fn attempt_score(points_earned: f64, total_points: i32) -> f64 {
        if total_points <= 0 {
            return 0.0;
        }
        (points_earned / total_points as f64 * 100.0).round()
    }
}

fn normalize_text(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn all_unique(ids: &[Uuid]) -> bool {
    let mut seen = HashSet::new();
    ids.iter().all(|id| seen.insert(*id))
}

fn check_known_ids(
    question: &Question,
    submitted: &[Uuid],
    known: impl Iterator<Item = Uuid>,
) -> Result<()> {
    let known: HashSet<Uuid> = known.collect();
    match submitted.iter().find(|id| !known.contains(id)) {
        Some(id) => Err(Error::Validation(format!(
            "Question {} has no option {}",
            question.id, id
        ))),
        None => Ok(()),
    }
}
