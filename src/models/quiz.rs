// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

use crate::services::visibility::QuizAccess;

/// Who may see a quiz. Stored as TEXT in the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    #[default]
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
        }
    }

    /// Decodes the database value. Unknown values hide the quiz rather
    /// than leak it; the schema CHECK constraint makes that unreachable.
    pub fn from_db(value: &str) -> Self {
        match value {
            "public" => Visibility::Public,
            _ => Visibility::Private,
        }
    }
}

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct QuizRow {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub visibility: String,
    pub user_id: Option<i64>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub text: String,
    pub quiz_id: i64,
}

/// Represents the 'answers' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct AnswerRow {
    pub id: i64,
    pub text: String,
    pub correct: bool,
    pub question_id: i64,
}

/// In-memory quiz aggregate: the quiz row plus its questions, answers and
/// the groups it is shared with, fully loaded. Evaluation and visibility
/// decisions operate on this, never on live database handles.
#[derive(Debug, Clone)]
pub struct Quiz {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub visibility: Visibility,
    pub owner_id: Option<i64>,
    pub authorized_group_ids: Vec<i64>,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub id: i64,
    pub text: String,
    pub correct: bool,
}

impl Question {
    /// The single answer flagged correct. Creation validates that exactly
    /// one exists; a violation surfaces here as None, never a panic.
    pub fn correct_answer(&self) -> Option<&Answer> {
        self.answers.iter().find(|a| a.correct)
    }
}

impl QuizAccess for Quiz {
    fn visibility(&self) -> Visibility {
        self.visibility
    }

    fn owner_id(&self) -> Option<i64> {
        self.owner_id
    }

    fn authorized_group_ids(&self) -> &[i64] {
        &self.authorized_group_ids
    }
}

/// Row shape for the quiz index: one row per quiz with the owner's email
/// and the question count joined in.
#[derive(Debug, FromRow)]
pub struct QuizSummaryRow {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub visibility: String,
    pub user_id: Option<i64>,
    pub owner_email: Option<String>,
    pub questions_count: i64,
}

/// List item returned by GET /api/quizzes.
#[derive(Debug, Serialize)]
pub struct QuizSummary {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub visibility: Visibility,
    pub owner_email: Option<String>,
    pub questions_count: i64,
    #[serde(skip_serializing)]
    pub owner_id: Option<i64>,
    #[serde(skip_serializing)]
    pub authorized_group_ids: Vec<i64>,
}

impl QuizSummary {
    pub fn from_row(row: QuizSummaryRow, authorized_group_ids: Vec<i64>) -> Self {
        QuizSummary {
            id: row.id,
            name: row.name,
            category: row.category,
            visibility: Visibility::from_db(&row.visibility),
            owner_email: row.owner_email,
            questions_count: row.questions_count,
            owner_id: row.user_id,
            authorized_group_ids,
        }
    }
}

impl QuizAccess for QuizSummary {
    fn visibility(&self) -> Visibility {
        self.visibility
    }

    fn owner_id(&self) -> Option<i64> {
        self.owner_id
    }

    fn authorized_group_ids(&self) -> &[i64] {
        &self.authorized_group_ids
    }
}

/// DTO for sending a question to a learner (excludes the correct flag).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub answers: Vec<PublicAnswer>,
}

#[derive(Debug, Serialize)]
pub struct PublicAnswer {
    pub id: i64,
    pub text: String,
}

/// Detail returned by GET /api/quizzes/{id}. Answer keys stay server-side.
#[derive(Debug, Serialize)]
pub struct QuizDetail {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub visibility: Visibility,
    pub owner_email: Option<String>,
    pub questions: Vec<PublicQuestion>,
    pub can_manage: bool,
    /// Group ids the quiz is shared with; only disclosed to the owner.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authorized_group_ids: Vec<i64>,
}

/// DTO for creating or replacing a quiz with its nested questions/answers.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 255, message = "Name must not be empty."))]
    pub name: String,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[validate(nested)]
    #[serde(default)]
    pub questions: Vec<QuestionPayload>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuestionPayload {
    #[validate(length(min = 1, max = 1000, message = "Question text must not be empty."))]
    pub text: String,
    #[validate(nested, custom(function = validate_answers))]
    pub answers: Vec<AnswerPayload>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AnswerPayload {
    #[validate(length(min = 1, max = 500, message = "Answer text must not be empty."))]
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

/// Every question carries exactly one correct answer.
fn validate_answers(answers: &[AnswerPayload]) -> Result<(), validator::ValidationError> {
    if answers.is_empty() {
        return Err(validator::ValidationError::new("answers_cannot_be_empty"));
    }
    let correct_count = answers.iter().filter(|a| a.correct).count();
    if correct_count != 1 {
        return Err(validator::ValidationError::new(
            "exactly_one_answer_must_be_correct",
        ));
    }
    Ok(())
}

/// DTO for sharing a quiz with a user group.
#[derive(Debug, Deserialize)]
pub struct ShareQuizRequest {
    pub group_id: i64,
}
