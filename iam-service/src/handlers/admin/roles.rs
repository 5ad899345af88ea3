//! Administrative role-permission management.
//!
//! Grant edits use full-replace semantics: the role's existing grants are
//! deleted and the submitted set inserted, then the permission cache entry is
//! invalidated before the response is produced.

use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::models::{AuditEvent, Role};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RolePermissionStatus {
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
}

/// Permission catalog annotated with the role's current grants.
///
/// GET /admin/roles/:role/permissions
pub async fn get_role_permissions(
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<Json<Vec<RolePermissionStatus>>, AppError> {
    let role = parse_role(&role)?;

    let catalog = state.store.list_permissions().await?;
    // Read the grants live; the admin view must not see a stale cache.
    let granted = state.store.permissions_for_role(role).await?;

    let statuses = catalog
        .into_iter()
        .map(|p| RolePermissionStatus {
            enabled: granted.contains(&p.name),
            name: p.name,
            description: p.description,
        })
        .collect();

    Ok(Json(statuses))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReplacePermissionsRequest {
    #[validate(length(max = 64))]
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ReplacePermissionsResponse {
    pub role: Role,
    pub permissions: Vec<String>,
}

/// Replace a role's permission grants. Requires the `manage_roles`
/// capability on top of the path-level admin guard.
///
/// PUT /admin/roles/:role/permissions
pub async fn replace_role_permissions(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(role): Path<String>,
    Json(payload): Json<ReplacePermissionsRequest>,
) -> Result<Json<ReplacePermissionsResponse>, AppError> {
    payload.validate()?;
    let role = parse_role(&role)?;

    if !state
        .permissions
        .has_permission(actor.user_id, "manage_roles")
        .await
    {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Missing permission: manage_roles"
        )));
    }

    let names: Vec<String> = payload
        .permissions
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    state.store.replace_role_grants(role, &names).await?;
    // Invalidate synchronously with the successful write; a stale read after
    // this point would be a correctness bug.
    state.permissions.invalidate(role);

    state
        .audit
        .record(AuditEvent::role_change(
            actor.user_id,
            serde_json::json!({
                "role": role.as_str(),
                "permissions": names,
            }),
        ))
        .await;

    Ok(Json(ReplacePermissionsResponse {
        role,
        permissions: names,
    }))
}

fn parse_role(raw: &str) -> Result<Role, AppError> {
    raw.parse()
        .map_err(|e: String| AppError::BadRequest(anyhow::anyhow!(e)))
}
