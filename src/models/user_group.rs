// src/models/user_group.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'user_groups' table in the database.
/// Groups are owned by a user and used to share private quizzes.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserGroup {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// List item for GET /api/groups: the group with its member count.
#[derive(Debug, Serialize, FromRow)]
pub struct UserGroupSummary {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub members_count: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A group member as shown on the group detail page.
#[derive(Debug, Serialize, FromRow)]
pub struct GroupMember {
    pub id: i64,
    pub email: String,
}

/// A quiz shared with the group, as shown on the group detail page.
#[derive(Debug, Serialize, FromRow)]
pub struct SharedQuiz {
    pub id: i64,
    pub name: String,
    pub owner_email: Option<String>,
}

/// Detail returned by GET /api/groups/{id}.
#[derive(Debug, Serialize)]
pub struct UserGroupDetail {
    #[serde(flatten)]
    pub group: UserGroup,
    pub members: Vec<GroupMember>,
    pub quizzes: Vec<SharedQuiz>,
    pub can_manage: bool,
}

/// DTO for creating a user group.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(
        min = 2,
        max = 100,
        message = "Name length must be between 2 and 100 characters."
    ))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// DTO for updating a user group. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateGroupRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// DTO for adding a member to a group by email.
#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    #[validate(email)]
    pub email: String,
}
