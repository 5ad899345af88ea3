//! In-memory access store used by integration tests.
//!
//! Mirrors the PostgreSQL implementation's contract, with switches to inject
//! store faults (audit writes, permission reads) for failure-isolation tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    AuditEvent, AuditLogEntry, Permission, Role, SanitizedUser, User,
};
use crate::services::store::{AccessStore, AuditLogQuery};

/// Permission catalog seeded for the dashboard.
pub const DEFAULT_PERMISSIONS: [(&str, &str); 5] = [
    ("manage_users", "Create, update and delete users"),
    ("manage_roles", "Edit role permission sets"),
    ("view_audit_logs", "Access the system audit logs"),
    ("manage_content", "Create, update and delete content"),
    ("approve_content", "Approve user-submitted content"),
];

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, User>>,
    permissions: Mutex<Vec<Permission>>,
    grants: Mutex<HashMap<Role, HashSet<String>>>,
    events: Mutex<Vec<AuditEvent>>,
    fail_audit_writes: AtomicBool,
    fail_permission_reads: AtomicBool,
    permission_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the default catalog and grants: admin holds every
    /// permission, moderator starts with `view_audit_logs` only.
    pub fn with_default_catalog() -> Self {
        let store = Self::new();
        {
            let mut permissions = store.permissions.lock().unwrap();
            for (name, description) in DEFAULT_PERMISSIONS {
                permissions.push(Permission {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    created_at: Utc::now(),
                });
            }
        }
        {
            let mut grants = store.grants.lock().unwrap();
            grants.insert(
                Role::Admin,
                DEFAULT_PERMISSIONS
                    .iter()
                    .map(|(name, _)| name.to_string())
                    .collect(),
            );
            grants.insert(
                Role::Moderator,
                HashSet::from(["view_audit_logs".to_string()]),
            );
        }
        store
    }

    pub fn seed_user(&self, name: &str, email: &str, role: Role) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            role,
            created_at: now,
            updated_at: now,
        };
        self.users.lock().unwrap().insert(user.id, user.clone());
        user
    }

    /// Snapshot of recorded audit events, oldest first.
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn set_fail_audit_writes(&self, fail: bool) {
        self.fail_audit_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_permission_reads(&self, fail: bool) {
        self.fail_permission_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of times the role→permission join has been read.
    pub fn permission_read_count(&self) -> usize {
        self.permission_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<SanitizedUser>, AppError> {
        let mut users: Vec<User> = self.users.lock().unwrap().values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users.into_iter().map(SanitizedUser::from).collect())
    }

    async fn find_user_role(&self, user_id: Uuid) -> Result<Option<Role>, AppError> {
        if self.fail_permission_reads.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "store unavailable"
            )));
        }
        Ok(self.users.lock().unwrap().get(&user_id).map(|u| u.role))
    }

    async fn update_user_role(&self, user_id: Uuid, role: Role) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        user.role = role;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, AppError> {
        let mut permissions = self.permissions.lock().unwrap().clone();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    async fn permissions_for_role(&self, role: Role) -> Result<HashSet<String>, AppError> {
        self.permission_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_permission_reads.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "store unavailable"
            )));
        }
        Ok(self
            .grants
            .lock()
            .unwrap()
            .get(&role)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_role_grants(
        &self,
        role: Role,
        permission_names: &[String],
    ) -> Result<(), AppError> {
        let known: HashSet<String> = self
            .permissions
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        if permission_names.iter().any(|n| !known.contains(n)) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown permission name in grant set"
            )));
        }
        self.grants
            .lock()
            .unwrap()
            .insert(role, permission_names.iter().cloned().collect());
        Ok(())
    }

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), AppError> {
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "store unavailable"
            )));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn list_audit_events(
        &self,
        query: &AuditLogQuery,
    ) -> Result<(Vec<AuditLogEntry>, i64), AppError> {
        let users = self.users.lock().unwrap();
        let events = self.events.lock().unwrap();

        let mut entries: Vec<AuditLogEntry> = events
            .iter()
            .map(|e| AuditLogEntry {
                id: e.id,
                user_id: e.user_id,
                user_name: e
                    .user_id
                    .and_then(|id| users.get(&id))
                    .map(|u| u.name.clone()),
                ip_address: e.ip_address.clone(),
                user_agent: e.user_agent.clone(),
                auth_method: e.auth_method,
                event_type: e.event_type,
                event_details: e.event_details.clone(),
                success: e.success,
                response_time_ms: e.response_time_ms,
                timestamp: e.timestamp,
            })
            .filter(|e| {
                query
                    .event_type
                    .map(|t| e.event_type == t)
                    .unwrap_or(true)
            })
            .filter(|e| match &query.search {
                Some(needle) => {
                    let needle = needle.to_lowercase();
                    e.user_name
                        .as_deref()
                        .map(|n| n.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                        || e.ip_address
                            .as_deref()
                            .map(|ip| ip.to_lowercase().contains(&needle))
                            .unwrap_or(false)
                        || e.event_details.to_lowercase().contains(&needle)
                }
                None => true,
            })
            .collect();

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let total = entries.len() as i64;

        let offset = query.offset.max(0) as usize;
        let limit = query.limit.max(0) as usize;
        let page = entries.into_iter().skip(offset).take(limit).collect();

        Ok((page, total))
    }
}
