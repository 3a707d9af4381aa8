// src/handlers/quizzes.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        quiz::{
            Answer, AnswerRow, CreateQuizRequest, PublicAnswer, PublicQuestion, Question,
            QuestionRow, Quiz, QuizDetail, QuizRow, QuizSummary, QuizSummaryRow,
            ShareQuizRequest, Visibility,
        },
        quiz_result_history::{AttemptResponse, HistoryResponse, QuizResultHistory},
    },
    services::{
        evaluation,
        visibility::{self, Viewer},
    },
    utils::{
        html::clean_html,
        jwt::{Claims, MaybeClaims},
    },
};

/// Builds the viewer identity for a signed-in user: their id plus the ids
/// of every group they belong to.
async fn resolve_viewer(pool: &PgPool, claims: &Claims) -> Result<Viewer, AppError> {
    let group_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT user_group_id FROM user_group_memberships WHERE user_id = $1",
    )
    .bind(claims.user_id())
    .fetch_all(pool)
    .await?;

    Ok(Viewer::new(claims.user_id(), group_ids))
}

/// Same, for routes that also serve anonymous visitors.
async fn resolve_maybe_viewer(
    pool: &PgPool,
    claims: &MaybeClaims,
) -> Result<Option<Viewer>, AppError> {
    match &claims.0 {
        Some(claims) => Ok(Some(resolve_viewer(pool, claims).await?)),
        None => Ok(None),
    }
}

/// Loads the full quiz aggregate: the row, its questions with answers in
/// quiz-defined order, and the ids of the groups it is shared with.
async fn load_quiz(pool: &PgPool, quiz_id: i64) -> Result<Option<Quiz>, AppError> {
    let Some(row) = sqlx::query_as::<_, QuizRow>(
        "SELECT id, name, category, visibility, user_id, created_at, updated_at
         FROM quizzes WHERE id = $1",
    )
    .bind(quiz_id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let question_rows = sqlx::query_as::<_, QuestionRow>(
        "SELECT id, text, quiz_id FROM questions
         WHERE quiz_id = $1 ORDER BY position, id",
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    let question_ids: Vec<i64> = question_rows.iter().map(|q| q.id).collect();

    let answer_rows = if question_ids.is_empty() {
        Vec::new()
    } else {
        sqlx::query_as::<_, AnswerRow>(
            "SELECT id, text, correct, question_id FROM answers
             WHERE question_id = ANY($1) ORDER BY position, id",
        )
        .bind(&question_ids)
        .fetch_all(pool)
        .await?
    };

    let mut answers_by_question: HashMap<i64, Vec<Answer>> = HashMap::new();
    for row in answer_rows {
        answers_by_question
            .entry(row.question_id)
            .or_default()
            .push(Answer {
                id: row.id,
                text: row.text,
                correct: row.correct,
            });
    }

    let questions = question_rows
        .into_iter()
        .map(|row| Question {
            answers: answers_by_question.remove(&row.id).unwrap_or_default(),
            id: row.id,
            text: row.text,
        })
        .collect();

    let authorized_group_ids: Vec<i64> =
        sqlx::query_scalar("SELECT user_group_id FROM quiz_user_groups WHERE quiz_id = $1")
            .bind(quiz_id)
            .fetch_all(pool)
            .await?;

    Ok(Some(Quiz {
        id: row.id,
        name: row.name,
        category: row.category,
        visibility: Visibility::from_db(&row.visibility),
        owner_id: row.user_id,
        authorized_group_ids,
        questions,
    }))
}

async fn load_visible_quiz(
    pool: &PgPool,
    quiz_id: i64,
    viewer: Option<&Viewer>,
) -> Result<Quiz, AppError> {
    let quiz = load_quiz(pool, quiz_id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    if !visibility::is_visible(&quiz, viewer) {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }

    Ok(quiz)
}

/// Lists every quiz the caller may see.
///
/// All summaries are loaded and the visibility predicate is applied in
/// process, so the index and the single-quiz check share one rule.
pub async fn list_quizzes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<MaybeClaims>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = resolve_maybe_viewer(&pool, &claims).await?;

    let rows = sqlx::query_as::<_, QuizSummaryRow>(
        r#"
        SELECT
            q.id, q.name, q.category, q.visibility, q.user_id,
            u.email AS owner_email,
            (SELECT COUNT(*) FROM questions WHERE quiz_id = q.id) AS questions_count
        FROM quizzes q
        LEFT JOIN users u ON u.id = q.user_id
        ORDER BY q.category NULLS FIRST, q.name, q.id
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list quizzes: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let shares = sqlx::query_as::<_, (i64, i64)>(
        "SELECT quiz_id, user_group_id FROM quiz_user_groups",
    )
    .fetch_all(&pool)
    .await?;

    let mut groups_by_quiz: HashMap<i64, Vec<i64>> = HashMap::new();
    for (quiz_id, group_id) in shares {
        groups_by_quiz.entry(quiz_id).or_default().push(group_id);
    }

    let summaries: Vec<QuizSummary> = rows
        .into_iter()
        .map(|row| {
            let group_ids = groups_by_quiz.remove(&row.id).unwrap_or_default();
            QuizSummary::from_row(row, group_ids)
        })
        .collect();

    Ok(Json(visibility::filter_visible(
        summaries,
        viewer.as_ref(),
    )))
}

/// Creates a quiz together with its nested questions and answers.
/// The caller becomes the owner.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<MaybeClaims>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = claims.require()?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut tx = pool.begin().await?;

    let quiz_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO quizzes (name, category, visibility, user_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(clean_html(&payload.name))
    .bind(payload.category.as_deref().map(clean_html))
    .bind(payload.visibility.as_str())
    .bind(claims.user_id())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    insert_questions(&mut tx, quiz_id, &payload).await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": quiz_id }))))
}

async fn insert_questions(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    quiz_id: i64,
    payload: &CreateQuizRequest,
) -> Result<(), AppError> {
    for (question_position, question) in payload.questions.iter().enumerate() {
        let question_id: i64 = sqlx::query_scalar(
            "INSERT INTO questions (text, quiz_id, position) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(clean_html(&question.text))
        .bind(quiz_id)
        .bind(question_position as i64)
        .fetch_one(&mut **tx)
        .await?;

        for (answer_position, answer) in question.answers.iter().enumerate() {
            sqlx::query(
                "INSERT INTO answers (text, correct, question_id, position)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(clean_html(&answer.text))
            .bind(answer.correct)
            .bind(question_id)
            .bind(answer_position as i64)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

/// Shows a quiz for taking: questions and answer options without the
/// correct flags. Visibility-checked.
pub async fn get_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<MaybeClaims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = resolve_maybe_viewer(&pool, &claims).await?;
    let quiz = load_visible_quiz(&pool, id, viewer.as_ref()).await?;

    let owner_email = match quiz.owner_id {
        Some(owner_id) => {
            sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = $1")
                .bind(owner_id)
                .fetch_optional(&pool)
                .await?
        }
        None => None,
    };

    let can_manage = visibility::can_manage(&quiz, viewer.as_ref());

    let questions = quiz
        .questions
        .iter()
        .map(|question| PublicQuestion {
            id: question.id,
            text: question.text.clone(),
            answers: question
                .answers
                .iter()
                .map(|answer| PublicAnswer {
                    id: answer.id,
                    text: answer.text.clone(),
                })
                .collect(),
        })
        .collect();

    Ok(Json(QuizDetail {
        id: quiz.id,
        name: quiz.name.clone(),
        category: quiz.category.clone(),
        visibility: quiz.visibility,
        owner_email,
        questions,
        can_manage,
        authorized_group_ids: if can_manage {
            quiz.authorized_group_ids.clone()
        } else {
            Vec::new()
        },
    }))
}

/// Replaces a quiz and its nested question set. Owner only.
pub async fn update_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<MaybeClaims>,
    Path(id): Path<i64>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = claims.require()?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let viewer = resolve_viewer(&pool, &claims).await?;
    let quiz = load_quiz(&pool, id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    if !visibility::can_manage(&quiz, Some(&viewer)) {
        return Err(AppError::Forbidden("Ownership required".to_string()));
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE quizzes SET name = $1, category = $2, visibility = $3, updated_at = now()
         WHERE id = $4",
    )
    .bind(clean_html(&payload.name))
    .bind(payload.category.as_deref().map(clean_html))
    .bind(payload.visibility.as_str())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    // Nested form semantics: the submitted question set replaces the old
    // one wholesale. Answers go with their questions via ON DELETE CASCADE.
    sqlx::query("DELETE FROM questions WHERE quiz_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    insert_questions(&mut tx, id, &payload).await?;

    tx.commit().await?;

    Ok(StatusCode::OK)
}

/// Deletes a quiz with its questions, answers, shares and history. Owner only.
pub async fn delete_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<MaybeClaims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let claims = claims.require()?;
    let viewer = resolve_viewer(&pool, &claims).await?;
    let quiz = load_quiz(&pool, id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    if !visibility::can_manage(&quiz, Some(&viewer)) {
        return Err(AppError::Forbidden("Ownership required".to_string()));
    }

    sqlx::query("DELETE FROM quizzes WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete quiz: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// DTO for submitting answers for evaluation.
/// Keys are question ids; values may arrive as strings or numbers.
#[derive(Debug, Deserialize)]
pub struct EvaluateQuizRequest {
    #[serde(default)]
    pub answers: HashMap<String, serde_json::Value>,
}

/// Evaluates a submission against a quiz and, for signed-in learners,
/// records the attempt.
pub async fn evaluate_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<MaybeClaims>,
    Path(id): Path<i64>,
    Json(payload): Json<EvaluateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = resolve_maybe_viewer(&pool, &claims).await?;
    let quiz = load_visible_quiz(&pool, id, viewer.as_ref()).await?;

    // Normalize the wire payload: numbers and strings both name answer
    // ids, anything else counts as unanswered.
    let answers: HashMap<String, String> = payload
        .answers
        .into_iter()
        .filter_map(|(question_id, value)| {
            let answer_id = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((question_id, answer_id))
        })
        .collect();

    let result = evaluation::evaluate(&quiz, &answers);

    // The computed result stands even if recording the attempt fails;
    // history is a side concern of evaluation, not part of it.
    if let Some(viewer) = &viewer {
        if result.questions_count > 0 {
            let inserted = sqlx::query(
                r#"
                INSERT INTO quiz_result_histories
                    (user_id, quiz_id, score, questions_count, completed_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(viewer.id)
            .bind(quiz.id)
            .bind(result.score)
            .bind(result.questions_count)
            .bind(chrono::Utc::now())
            .execute(&pool)
            .await;

            if let Err(e) = inserted {
                tracing::error!("Failed to record quiz attempt: {:?}", e);
            }
        }
    }

    Ok(Json(result))
}

/// Returns the caller's attempt history for a quiz: all attempts newest
/// first, plus the best and the most recent one.
pub async fn quiz_history(
    State(pool): State<PgPool>,
    Extension(claims): Extension<MaybeClaims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let claims = claims.require()?;
    let viewer = resolve_viewer(&pool, &claims).await?;
    let _quiz = load_visible_quiz(&pool, id, Some(&viewer)).await?;

    let attempts = sqlx::query_as::<_, QuizResultHistory>(
        r#"
        SELECT id, user_id, quiz_id, score, questions_count, completed_at
        FROM quiz_result_histories
        WHERE user_id = $1 AND quiz_id = $2
        ORDER BY completed_at DESC, id DESC
        "#,
    )
    .bind(viewer.id)
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let latest = attempts.first().cloned().map(AttemptResponse::from);
    // Best attempt ranks by percentage; equal percentages go to the more
    // recent attempt.
    let best = attempts
        .iter()
        .max_by(|a, b| {
            a.percentage()
                .partial_cmp(&b.percentage())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.completed_at.cmp(&b.completed_at))
        })
        .cloned()
        .map(AttemptResponse::from);

    Ok(Json(HistoryResponse {
        attempts: attempts.into_iter().map(AttemptResponse::from).collect(),
        best,
        latest,
    }))
}

/// Shares a quiz with a user group. Requires owning the quiz and the group.
pub async fn share_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<MaybeClaims>,
    Path(id): Path<i64>,
    Json(payload): Json<ShareQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = claims.require()?;
    let viewer = resolve_viewer(&pool, &claims).await?;
    let quiz = load_quiz(&pool, id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    if !visibility::can_manage(&quiz, Some(&viewer)) {
        return Err(AppError::Forbidden("Ownership required".to_string()));
    }

    let group_owner_id: Option<i64> =
        sqlx::query_scalar("SELECT owner_id FROM user_groups WHERE id = $1")
            .bind(payload.group_id)
            .fetch_optional(&pool)
            .await?;

    let group_owner_id = group_owner_id.ok_or(AppError::NotFound("Group not found".to_string()))?;
    if group_owner_id != viewer.id {
        return Err(AppError::Forbidden("Ownership required".to_string()));
    }

    sqlx::query(
        r#"
        INSERT INTO quiz_user_groups (quiz_id, user_group_id)
        VALUES ($1, $2)
        ON CONFLICT (quiz_id, user_group_id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(payload.group_id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to share quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::CREATED)
}

/// Revokes a group's access to a quiz. Quiz owner only.
pub async fn unshare_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<MaybeClaims>,
    Path((id, group_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let claims = claims.require()?;
    let viewer = resolve_viewer(&pool, &claims).await?;
    let quiz = load_quiz(&pool, id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    if !visibility::can_manage(&quiz, Some(&viewer)) {
        return Err(AppError::Forbidden("Ownership required".to_string()));
    }

    let result = sqlx::query(
        "DELETE FROM quiz_user_groups WHERE quiz_id = $1 AND user_group_id = $2",
    )
    .bind(id)
    .bind(group_id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Quiz is not shared with this group".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
