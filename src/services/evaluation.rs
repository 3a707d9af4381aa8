// src/services/evaluation.rs

use std::collections::HashMap;

use serde::Serialize;

use crate::models::quiz::Quiz;

/// Outcome of scoring one submission against a quiz.
#[derive(Debug, Clone, Serialize)]
pub struct QuizResult {
    pub score: i64,
    pub questions_count: i64,
    pub question_results: Vec<QuestionResult>,
}

/// Outcome for a single question within a submission.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionResult {
    pub question_id: i64,
    /// None only if the question carries no correct answer, which creation
    /// validation rules out; such a question can never be answered correctly.
    pub correct_answer_id: Option<i64>,
    /// None when the learner left the question unanswered.
    pub submitted_answer_id: Option<i64>,
    pub correct: bool,
}

/// Scores a submission against a quiz.
///
/// `answers` maps question ids to answer ids, both as strings (JSON object
/// keys are strings on the wire). Missing entries, extra entries and values
/// that name no answer are all tolerated: they score as incorrect, never
/// as an error. A quiz with no questions yields score 0 over 0 questions.
///
/// Pure function of its inputs: no I/O, no randomness, same submission
/// always produces the same result.
pub fn evaluate(quiz: &Quiz, answers: &HashMap<String, String>) -> QuizResult {
    let mut score = 0;
    let mut question_results = Vec::with_capacity(quiz.questions.len());

    for question in &quiz.questions {
        let correct_answer_id = question.correct_answer().map(|a| a.id);
        let submitted_answer_id = answers
            .get(&question.id.to_string())
            .and_then(|raw| raw.parse::<i64>().ok());

        let correct =
            correct_answer_id.is_some() && submitted_answer_id == correct_answer_id;
        if correct {
            score += 1;
        }

        question_results.push(QuestionResult {
            question_id: question.id,
            correct_answer_id,
            submitted_answer_id,
            correct,
        });
    }

    QuizResult {
        score,
        questions_count: question_results.len() as i64,
        question_results,
    }
}
