// src/handlers/user_groups.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::user_group::{
        AddMemberRequest, CreateGroupRequest, GroupMember, SharedQuiz, UpdateGroupRequest,
        UserGroup, UserGroupDetail, UserGroupSummary,
    },
    utils::{html::clean_html, jwt::Claims},
};

async fn load_group(pool: &PgPool, group_id: i64) -> Result<UserGroup, AppError> {
    sqlx::query_as::<_, UserGroup>(
        "SELECT id, name, description, owner_id, created_at FROM user_groups WHERE id = $1",
    )
    .bind(group_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Group not found".to_string()))
}

async fn is_member(pool: &PgPool, group_id: i64, user_id: i64) -> Result<bool, AppError> {
    let membership_id: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM user_group_memberships WHERE user_group_id = $1 AND user_id = $2",
    )
    .bind(group_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(membership_id.is_some())
}

/// Lists the groups owned by the current user, with member counts.
pub async fn list_groups(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let groups = sqlx::query_as::<_, UserGroupSummary>(
        r#"
        SELECT
            g.id, g.name, g.description, g.created_at,
            (SELECT COUNT(*) FROM user_group_memberships WHERE user_group_id = g.id)
                AS members_count
        FROM user_groups g
        WHERE g.owner_id = $1
        ORDER BY g.name, g.id
        "#,
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list groups: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(groups))
}

/// Creates a user group owned by the current user.
pub async fn create_group(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let group = sqlx::query_as::<_, UserGroup>(
        r#"
        INSERT INTO user_groups (name, description, owner_id)
        VALUES ($1, $2, $3)
        RETURNING id, name, description, owner_id, created_at
        "#,
    )
    .bind(clean_html(&payload.name))
    .bind(payload.description.as_deref().map(clean_html))
    .bind(claims.user_id())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create group: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(group)))
}

/// Shows a group with its members and the quizzes shared to it.
/// Restricted to the owner and members.
pub async fn get_group(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&pool, id).await?;

    let user_id = claims.user_id();
    let can_manage = group.owner_id == user_id;
    if !can_manage && !is_member(&pool, id, user_id).await? {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }

    let members = sqlx::query_as::<_, GroupMember>(
        r#"
        SELECT u.id, u.email
        FROM user_group_memberships m
        JOIN users u ON u.id = m.user_id
        WHERE m.user_group_id = $1
        ORDER BY u.email
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let quizzes = sqlx::query_as::<_, SharedQuiz>(
        r#"
        SELECT q.id, q.name, u.email AS owner_email
        FROM quiz_user_groups s
        JOIN quizzes q ON q.id = s.quiz_id
        LEFT JOIN users u ON u.id = q.user_id
        WHERE s.user_group_id = $1
        ORDER BY q.name, q.id
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(UserGroupDetail {
        group,
        members,
        quizzes,
        can_manage,
    }))
}

/// Updates a group's name or description. Owner only.
pub async fn update_group(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let group = load_group(&pool, id).await?;
    if group.owner_id != claims.user_id() {
        return Err(AppError::Forbidden("Ownership required".to_string()));
    }

    if let Some(name) = payload.name {
        sqlx::query("UPDATE user_groups SET name = $1 WHERE id = $2")
            .bind(clean_html(&name))
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(description) = payload.description {
        sqlx::query("UPDATE user_groups SET description = $1 WHERE id = $2")
            .bind(clean_html(&description))
            .bind(id)
            .execute(&pool)
            .await?;
    }

    Ok(StatusCode::OK)
}

/// Deletes a group and all its memberships and quiz shares. Owner only.
pub async fn delete_group(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&pool, id).await?;
    if group.owner_id != claims.user_id() {
        return Err(AppError::Forbidden("Ownership required".to_string()));
    }

    sqlx::query("DELETE FROM user_groups WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete group: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Adds an existing user to a group by email. Owner only, idempotent.
pub async fn add_member(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let group = load_group(&pool, id).await?;
    if group.owner_id != claims.user_id() {
        return Err(AppError::Forbidden("Ownership required".to_string()));
    }

    let user_id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(&payload.email)
            .fetch_optional(&pool)
            .await?;

    let user_id = user_id.ok_or(AppError::NotFound("User not found".to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO user_group_memberships (user_id, user_group_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, user_group_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to add group member: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "user_id": user_id }))))
}

/// Removes a user from a group. Owner only.
pub async fn remove_member(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((id, user_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_group(&pool, id).await?;
    if group.owner_id != claims.user_id() {
        return Err(AppError::Forbidden("Ownership required".to_string()));
    }

    let result = sqlx::query(
        "DELETE FROM user_group_memberships WHERE user_group_id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Membership not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
