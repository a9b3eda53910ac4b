use crate::models::attempt::{AttemptStatus, QuizAttempt};
use crate::models::question::Question;
use crate::models::quiz::QuizAnalytics;

/// Streaming accumulator over attempts. `recompute` drives it as a full
/// refold; an incremental caller can hold one and `observe` attempts as
/// they conclude without changing any observable result.
#[derive(Debug, Default)]
pub struct AnalyticsFold {
    total: i64,
    graded: i64,
    pending_review: i64,
    abandoned: i64,
    passed: i64,
    score_sum: f64,
    highest: Option<f64>,
    lowest: Option<f64>,
    duration_seconds_sum: i64,
    durations: i64,
}

impl AnalyticsFold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, attempt: &QuizAttempt) {
        self.total += 1;
        match attempt.status {
            AttemptStatus::InProgress => {}
            AttemptStatus::AwaitingReview => self.pending_review += 1,
            AttemptStatus::Abandoned => self.abandoned += 1,
            AttemptStatus::Submitted | AttemptStatus::AutoSubmitted => {
                self.graded += 1;
                let score = attempt.score.unwrap_or(0.0);
                self.score_sum += score;
                self.highest = Some(self.highest.map_or(score, |h| h.max(score)));
                self.lowest = Some(self.lowest.map_or(score, |l| l.min(score)));
                if attempt.passed.unwrap_or(false) {
                    self.passed += 1;
                }
                if let Some(seconds) = attempt.time_spent_seconds {
                    self.duration_seconds_sum += seconds;
                    self.durations += 1;
                }
            }
        }
    }

    pub fn finish(self, questions: &[Question]) -> QuizAnalytics {
        let difficulty_rating = if questions.is_empty() {
            0.0
        } else {
            questions.iter().map(|q| q.stats.difficulty).sum::<f64>() / questions.len() as f64
        };

        QuizAnalytics {
            total_attempts: self.total,
            graded_attempts: self.graded,
            pending_review_attempts: self.pending_review,
            abandoned_attempts: self.abandoned,
            average_score: if self.graded > 0 {
                self.score_sum / self.graded as f64
            } else {
                0.0
            },
            highest_score: self.highest.unwrap_or(0.0),
            lowest_score: self.lowest.unwrap_or(0.0),
            // Pass rate is over graded attempts only; abandonment counts
            // every attempt ever started in its denominator.
            pass_rate: if self.graded > 0 {
                self.passed as f64 / self.graded as f64
            } else {
                0.0
            },
            abandonment_rate: if self.total > 0 {
                self.abandoned as f64 / self.total as f64
            } else {
                0.0
            },
            average_duration_minutes: if self.durations > 0 {
                self.duration_seconds_sum as f64 / self.durations as f64 / 60.0
            } else {
                0.0
            },
            difficulty_rating,
        }
    }
}

/// O(attempts) refold, run after every attempt conclusion.
pub fn recompute(questions: &[Question], attempts: &[QuizAttempt]) -> QuizAnalytics {
    let mut fold = AnalyticsFold::new();
    for attempt in attempts {
        fold.observe(attempt);
    }
    fold.finish(questions)
}
