//! PostgreSQL implementation of the access store.
//!
//! Uses sqlx with runtime-bound queries.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    AuditEvent, AuditLogEntry, AuthMethod, EventType, Permission, Role, SanitizedUser, User,
};
use crate::services::store::{AccessStore, AuditLogQuery};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Raw user row; role is stored as text and decoded leniently.
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            name: r.name,
            email: r.email,
            role: Role::from_external(&r.role),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    id: Uuid,
    user_id: Option<Uuid>,
    user_name: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    auth_method: String,
    event_type: String,
    event_details: String,
    success: bool,
    response_time_ms: Option<i64>,
    timestamp: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = AppError;

    fn try_from(r: AuditRow) -> Result<Self, AppError> {
        let auth_method: AuthMethod = r
            .auth_method
            .parse()
            .map_err(|e: String| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        let event_type: EventType = r
            .event_type
            .parse()
            .map_err(|e: String| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(AuditLogEntry {
            id: r.id,
            user_id: r.user_id,
            user_name: r.user_name,
            ip_address: r.ip_address,
            user_agent: r.user_agent,
            auth_method,
            event_type,
            event_details: r.event_details,
            success: r.success,
            response_time_ms: r.response_time_ms,
            timestamp: r.timestamp,
        })
    }
}

#[async_trait]
impl AccessStore for Database {
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn list_users(&self) -> Result<Vec<SanitizedUser>, AppError> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| SanitizedUser::from(User::from(r)))
            .collect())
    }

    async fn find_user_role(&self, user_id: Uuid) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role.map(|r| Role::from_external(&r)))
    }

    async fn update_user_role(&self, user_id: Uuid, role: Role) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "UPDATE users SET role = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(user_id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        Ok(row.into())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, AppError> {
        let permissions =
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(permissions)
    }

    async fn permissions_for_role(&self, role: Role) -> Result<HashSet<String>, AppError> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.name
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            WHERE rp.role = $1
            "#,
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(names.into_iter().collect())
    }

    async fn replace_role_grants(
        &self,
        role: Role,
        permission_names: &[String],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role = $1")
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;

        if !permission_names.is_empty() {
            let inserted = sqlx::query(
                r#"
                INSERT INTO role_permissions (role, permission_id)
                SELECT $1, id FROM permissions WHERE name = ANY($2)
                "#,
            )
            .bind(role.as_str())
            .bind(permission_names)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted != permission_names.len() as u64 {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Unknown permission name in grant set"
                )));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO auth_events
                (id, user_id, ip_address, user_agent, auth_method, event_type,
                 event_details, success, response_time_ms, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(event.auth_method.as_str())
        .bind(event.event_type.as_str())
        .bind(&event.event_details)
        .bind(event.success)
        .bind(event.response_time_ms)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_audit_events(
        &self,
        query: &AuditLogQuery,
    ) -> Result<(Vec<AuditLogEntry>, i64), AppError> {
        let event_type = query.event_type.map(|t| t.as_str().to_string());
        let search = query.search.as_ref().map(|s| format!("%{}%", s));

        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT e.id, e.user_id, u.name AS user_name, e.ip_address, e.user_agent,
                   e.auth_method, e.event_type, e.event_details, e.success,
                   e.response_time_ms, e.timestamp
            FROM auth_events e
            LEFT JOIN users u ON u.id = e.user_id
            WHERE ($1::text IS NULL OR e.event_type = $1)
              AND ($2::text IS NULL
                   OR u.name ILIKE $2
                   OR e.ip_address ILIKE $2
                   OR e.event_details ILIKE $2)
            ORDER BY e.timestamp DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&event_type)
        .bind(&search)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM auth_events e
            LEFT JOIN users u ON u.id = e.user_id
            WHERE ($1::text IS NULL OR e.event_type = $1)
              AND ($2::text IS NULL
                   OR u.name ILIKE $2
                   OR e.ip_address ILIKE $2
                   OR e.event_details ILIKE $2)
            "#,
        )
        .bind(&event_type)
        .bind(&search)
        .fetch_one(&self.pool)
        .await?;

        let events = rows
            .into_iter()
            .map(AuditLogEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((events, total))
    }
}
