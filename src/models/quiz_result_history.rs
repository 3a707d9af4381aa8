// src/models/quiz_result_history.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'quiz_result_histories' table in the database.
/// One immutable row per scored attempt by a signed-in learner.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizResultHistory {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub score: i64,
    pub questions_count: i64,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Traffic-light rating of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceLevel {
    Green,
    Yellow,
    Red,
}

impl QuizResultHistory {
    /// Percentage score for this attempt, rounded to one decimal place.
    pub fn percentage(&self) -> f64 {
        if self.questions_count == 0 {
            return 0.0;
        }
        (self.score as f64 / self.questions_count as f64 * 1000.0).round() / 10.0
    }

    /// Green at 75% and above, yellow at 40% and above, red below.
    pub fn performance_level(&self) -> PerformanceLevel {
        let pct = self.percentage();
        if pct >= 75.0 {
            PerformanceLevel::Green
        } else if pct >= 40.0 {
            PerformanceLevel::Yellow
        } else {
            PerformanceLevel::Red
        }
    }
}

/// One attempt as rendered in the history endpoint.
#[derive(Debug, Serialize)]
pub struct AttemptResponse {
    pub id: i64,
    pub score: i64,
    pub questions_count: i64,
    pub percentage: f64,
    pub performance_level: PerformanceLevel,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

impl From<QuizResultHistory> for AttemptResponse {
    fn from(history: QuizResultHistory) -> Self {
        AttemptResponse {
            id: history.id,
            score: history.score,
            questions_count: history.questions_count,
            percentage: history.percentage(),
            performance_level: history.performance_level(),
            completed_at: history.completed_at,
        }
    }
}

/// Response for GET /api/quizzes/{id}/history.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub attempts: Vec<AttemptResponse>,
    pub best: Option<AttemptResponse>,
    pub latest: Option<AttemptResponse>,
}
