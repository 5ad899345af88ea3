//! Administrative user management.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::models::{AuditEvent, Role, SanitizedUser};
use crate::AppState;

/// List all users.
///
/// GET /admin/users
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<SanitizedUser>>, AppError> {
    let users = state.store.list_users().await?;
    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// Change a user's role. Requires the `manage_users` capability on top of the
/// path-level admin guard; the mutation is audited as a `role_change` event.
///
/// PATCH /admin/users/:id/role
pub async fn update_user_role(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<SanitizedUser>, AppError> {
    if !state
        .permissions
        .has_permission(actor.user_id, "manage_users")
        .await
    {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Missing permission: manage_users"
        )));
    }

    let before = state
        .store
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    let updated = state.store.update_user_role(user_id, payload.role).await?;

    state
        .audit
        .record(AuditEvent::role_change(
            actor.user_id,
            serde_json::json!({
                "target_user_id": user_id,
                "from": before.role.as_str(),
                "to": payload.role.as_str(),
            }),
        ))
        .await;

    Ok(Json(updated.into()))
}
