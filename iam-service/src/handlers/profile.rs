//! Profile handlers for the signed-in user.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::models::SanitizedUser;
use crate::AppState;

/// Return the calling identity's profile.
///
/// GET /profile
pub async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Json<SanitizedUser>, AppError> {
    let user = state
        .store
        .find_user(identity.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
    Ok(Json(user.into()))
}

#[derive(Debug, Serialize)]
pub struct PermissionCheckResponse {
    pub permission: String,
    pub allowed: bool,
}

/// Server-side capability probe for conditional UI.
///
/// GET /api/me/permissions/:name
pub async fn check_permission(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(name): Path<String>,
) -> Result<Json<PermissionCheckResponse>, AppError> {
    let allowed = state.permissions.has_permission(identity.user_id, &name).await;
    Ok(Json(PermissionCheckResponse {
        permission: name,
        allowed,
    }))
}
