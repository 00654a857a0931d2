//! Admin-only account management.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{hash_password, SharedState};
use crate::error::ServiceError;
use crate::gate::require_role;
use crate::models::{Caller, Role, User, UserView};
use crate::persist::UserWrite;

/// Changes requested for one account.
#[derive(Debug, Default, PartialEq)]
struct UserChanges {
    email: Option<String>,
    role: Option<Role>,
    password: Option<String>,
}

impl UserChanges {
    fn from_json(body: &Value) -> Result<Self, ServiceError> {
        let obj = body
            .as_object()
            .ok_or_else(|| ServiceError::Validation("Request body must be a JSON object".into()))?;

        let mut changes = UserChanges::default();
        if let Some(email) = obj.get("email").and_then(Value::as_str) {
            let email = email.trim();
            if email.is_empty() {
                return Err(ServiceError::Validation("Email cannot be empty".into()));
            }
            changes.email = Some(email.to_string());
        }
        if let Some(role) = obj.get("role") {
            changes.role = Some(
                role.as_str()
                    .and_then(Role::from_label)
                    .ok_or_else(|| ServiceError::Validation("Invalid role specified".into()))?,
            );
        }
        if let Some(password) = obj.get("password").and_then(Value::as_str) {
            if !password.is_empty() {
                changes.password = Some(password.to_string());
            }
        }

        if changes == UserChanges::default() {
            return Err(ServiceError::Validation("No fields provided for update".into()));
        }
        Ok(changes)
    }
}

fn parse_user_id(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ServiceError::Validation("Invalid User ID format".into()))
}

fn load_user(state: &SharedState, id: Uuid) -> Result<User, ServiceError> {
    state
        .save_file
        .get_user(id)?
        .ok_or_else(|| ServiceError::NotFound("User not found".into()))
}

// GET /api/users
pub async fn list_users(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<UserView>>, ServiceError> {
    require_role(&caller, Role::Admin)?;
    let users = state.save_file.list_users()?;
    Ok(Json(users.iter().map(User::to_view).collect()))
}

// GET /api/users/:id
pub async fn get_user(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<UserView>, ServiceError> {
    require_role(&caller, Role::Admin)?;
    let user = load_user(&state, parse_user_id(&id)?)?;
    Ok(Json(user.to_view()))
}

// PUT /api/users/:id
pub async fn update_user(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServiceError> {
    require_role(&caller, Role::Admin)?;
    let id = parse_user_id(&id)?;
    let changes = UserChanges::from_json(&body)?;

    let mut user = load_user(&state, id)?;
    if let Some(email) = changes.email {
        user.email = email;
    }
    if let Some(role) = changes.role {
        user.role = role;
    }
    if let Some(password) = changes.password {
        user.password_hash = hash_password(&password)?;
    }

    match state.save_file.update_user(&user)? {
        UserWrite::Saved => {
            tracing::info!(user_id = %user.id, admin = %caller.id, "user updated");
            Ok(Json(json!({ "msg": "User updated successfully" })))
        }
        UserWrite::NotFound => Err(ServiceError::NotFound("User not found".into())),
        UserWrite::EmailTaken => {
            Err(ServiceError::Conflict("User with this email already exists".into()))
        }
    }
}

// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    require_role(&caller, Role::Admin)?;
    let user = load_user(&state, parse_user_id(&id)?)?;

    let tasks_deleted = state.engine.purge_user_tasks(user.id)?;
    state.save_file.delete_user(user.id)?;

    tracing::info!(user_id = %user.id, admin = %caller.id, tasks_deleted, "user deleted");
    Ok(Json(json!({
        "msg": "User and associated tasks deleted successfully",
        "tasks_deleted": tasks_deleted,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changes_pick_up_known_fields() {
        let changes = UserChanges::from_json(&json!({"email": " new@x.io ", "role": "admin"})).unwrap();
        assert_eq!(changes.email.as_deref(), Some("new@x.io"));
        assert_eq!(changes.role, Some(Role::Admin));
        assert_eq!(changes.password, None);
    }

    #[test]
    fn invalid_role_is_rejected() {
        assert!(matches!(
            UserChanges::from_json(&json!({"role": "root"})),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn nothing_recognised_is_rejected() {
        assert!(matches!(
            UserChanges::from_json(&json!({"nickname": "bob"})),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(UserChanges::from_json(&json!([1])), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn user_ids_must_be_well_formed() {
        assert!(parse_user_id("nope").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_user_id(&id.to_string()).unwrap(), id);
    }
}
