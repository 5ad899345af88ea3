//! Audit-log viewer.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{AuditLogEntry, EventType};
use crate::services::AuditLogQuery;
use crate::AppState;

/// Query params for the audit-log viewer.
#[derive(Debug, Deserialize)]
pub struct ListAuditLogsQuery {
    /// Event type code, or "all".
    pub event_type: Option<String>,
    /// Free-text search over actor name, IP address and event details.
    pub search: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Paginated audit events response.
#[derive(Debug, Serialize)]
pub struct AuditLogsResponse {
    pub events: Vec<AuditLogEntry>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// List audit events, newest first, with filtering and pagination.
///
/// GET /admin/audit-logs
#[tracing::instrument(skip(state), fields(event_type = ?query.event_type, limit = query.limit, offset = query.offset))]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<ListAuditLogsQuery>,
) -> Result<Json<AuditLogsResponse>, AppError> {
    let event_type = match query.event_type.as_deref() {
        None | Some("all") => None,
        Some(raw) => Some(
            raw.parse::<EventType>()
                .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?,
        ),
    };

    let limit = query.limit.clamp(1, 500);
    let offset = query.offset.max(0);

    let filter = AuditLogQuery {
        event_type,
        search: query.search.filter(|s| !s.is_empty()),
        limit,
        offset,
    };

    let (events, total) = state.store.list_audit_events(&filter).await?;

    Ok(Json(AuditLogsResponse {
        events,
        total,
        limit,
        offset,
    }))
}
