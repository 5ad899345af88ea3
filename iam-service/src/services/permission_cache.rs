//! Process-wide role→permission cache.
//!
//! Populated lazily from the store on first read per role, served from memory
//! afterwards. Invalidation is removal only; a later read repopulates.
//! Concurrent populates for the same role are benign: the read is idempotent
//! and the last writer wins.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Role;
use crate::services::store::AccessStore;

#[derive(Clone)]
pub struct PermissionCache {
    store: Arc<dyn AccessStore>,
    cache: Arc<DashMap<Role, Arc<HashSet<String>>>>,
}

impl PermissionCache {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self {
            store,
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Permission names granted to a role, from cache or a single store read.
    ///
    /// A store failure propagates and leaves the entry unpopulated, so a
    /// later call retries.
    pub async fn permissions_for_role(
        &self,
        role: Role,
    ) -> Result<Arc<HashSet<String>>, AppError> {
        if let Some(cached) = self.cache.get(&role) {
            return Ok(Arc::clone(cached.value()));
        }

        let fresh = Arc::new(self.store.permissions_for_role(role).await?);
        self.cache.insert(role, Arc::clone(&fresh));
        Ok(fresh)
    }

    /// Drop the cached set for a role. Must be called synchronously after
    /// every successful grant mutation for that role.
    pub fn invalidate(&self, role: Role) {
        self.cache.remove(&role);
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    /// Capability check: does the user's role hold the named permission?
    ///
    /// Fail closed: a missing user, an absent permission or any store fault
    /// all answer `false`.
    pub async fn has_permission(&self, user_id: Uuid, permission: &str) -> bool {
        let role = match self.store.find_user_role(user_id).await {
            Ok(Some(role)) => role,
            Ok(None) => {
                tracing::debug!(user_id = %user_id, "Permission check for unknown user");
                return false;
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Permission check failed resolving user role"
                );
                return false;
            }
        };

        match self.permissions_for_role(role).await {
            Ok(granted) => granted.contains(permission),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    role = %role,
                    permission = permission,
                    error = %e,
                    "Permission check failed resolving role grants"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryStore;

    fn cache_over(store: Arc<MemoryStore>) -> PermissionCache {
        PermissionCache::new(store)
    }

    #[tokio::test]
    async fn test_populates_once_per_role() {
        let store = Arc::new(MemoryStore::with_default_catalog());
        let cache = cache_over(Arc::clone(&store));

        let first = cache.permissions_for_role(Role::Admin).await.unwrap();
        let second = cache.permissions_for_role(Role::Admin).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.permission_read_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_fresh_read() {
        let store = Arc::new(MemoryStore::with_default_catalog());
        let cache = cache_over(Arc::clone(&store));

        let before = cache.permissions_for_role(Role::Moderator).await.unwrap();
        assert!(before.contains("view_audit_logs"));

        store
            .replace_role_grants(
                Role::Moderator,
                &["manage_content".to_string(), "approve_content".to_string()],
            )
            .await
            .unwrap();
        cache.invalidate(Role::Moderator);

        let after = cache.permissions_for_role(Role::Moderator).await.unwrap();
        assert!(!after.contains("view_audit_logs"));
        assert!(after.contains("manage_content"));
        assert!(after.contains("approve_content"));
    }

    #[tokio::test]
    async fn test_concurrent_first_reads_converge() {
        let store = Arc::new(MemoryStore::with_default_catalog());
        let cache = cache_over(store);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.permissions_for_role(Role::Admin).await.unwrap()
            }));
        }

        let mut sets = Vec::new();
        for handle in handles {
            sets.push(handle.await.unwrap());
        }
        for set in &sets {
            assert_eq!(*set, sets[0]);
        }
    }

    #[tokio::test]
    async fn test_populate_fault_denies_and_leaves_cache_empty() {
        let store = Arc::new(MemoryStore::with_default_catalog());
        let user = store.seed_user("Ana", "ana@example.com", Role::Admin);
        let cache = cache_over(Arc::clone(&store));

        store.set_fail_permission_reads(true);
        assert!(!cache.has_permission(user.id, "manage_users").await);

        // Store recovers; the next read repopulates.
        store.set_fail_permission_reads(false);
        assert!(cache.has_permission(user.id, "manage_users").await);
    }

    #[tokio::test]
    async fn test_unknown_user_or_permission_denied() {
        let store = Arc::new(MemoryStore::with_default_catalog());
        let user = store.seed_user("Bob", "bob@example.com", Role::User);
        let cache = cache_over(store);

        assert!(!cache.has_permission(Uuid::new_v4(), "manage_users").await);
        assert!(!cache.has_permission(user.id, "manage_users").await);
        assert!(!cache.has_permission(user.id, "no_such_permission").await);
    }
}
