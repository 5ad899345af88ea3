//! Durable-store contract consumed by the access-control core.
//!
//! The core never talks to PostgreSQL directly; everything goes through this
//! trait so tests can swap in an in-memory implementation.

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AuditEvent, AuditLogEntry, EventType, Permission, Role, SanitizedUser, User};

/// Filter for the audit-log viewer query.
#[derive(Debug, Clone, Default)]
pub struct AuditLogQuery {
    pub event_type: Option<EventType>,
    /// Case-insensitive substring match over actor name, IP and event details.
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    async fn list_users(&self) -> Result<Vec<SanitizedUser>, AppError>;

    /// Look up just the role of a user. Used by capability checks.
    async fn find_user_role(&self, user_id: Uuid) -> Result<Option<Role>, AppError>;

    async fn update_user_role(&self, user_id: Uuid, role: Role) -> Result<User, AppError>;

    async fn list_permissions(&self) -> Result<Vec<Permission>, AppError>;

    /// Permission names granted to a role (grants joined with the catalog).
    async fn permissions_for_role(&self, role: Role) -> Result<HashSet<String>, AppError>;

    /// Replace all grants for a role with the given permission names,
    /// atomically (delete existing, insert new set).
    async fn replace_role_grants(
        &self,
        role: Role,
        permission_names: &[String],
    ) -> Result<(), AppError>;

    /// Append one audit event row.
    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), AppError>;

    /// Viewer query: filtered page of events (newest first) plus total count.
    async fn list_audit_events(
        &self,
        query: &AuditLogQuery,
    ) -> Result<(Vec<AuditLogEntry>, i64), AppError>;
}
