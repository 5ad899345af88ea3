//! Path-based access policy.
//!
//! An ordered set of (path prefix, guard) rules evaluated by longest-prefix
//! match. A request path is judged against the single most specific matching
//! rule only; overlapping rules do not stack.

use crate::models::Role;
use crate::services::session::SessionIdentity;

/// Outcome of an authorization decision. Not an error: redirects are normal
/// control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    RedirectToSignIn,
    RedirectToAccessDenied,
}

#[derive(Debug, Clone)]
enum RouteGuard {
    /// Any authenticated identity may pass.
    AuthenticatedOnly,
    /// Only identities whose role is in the set may pass.
    RoleIn(Vec<Role>),
}

#[derive(Debug, Clone)]
struct PathRule {
    prefix: String,
    guard: RouteGuard,
}

/// Static role-to-path rules for the dashboard.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    rules: Vec<PathRule>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dashboard's rule set: `/profile` requires authentication,
    /// `/moderator` is for moderators and admins, `/admin` (including the
    /// nested audit-log viewer) is admin only.
    pub fn dashboard_defaults() -> Self {
        Self::new()
            .require_authenticated("/profile")
            .require_roles("/moderator", &[Role::Admin, Role::Moderator])
            .require_roles("/admin", &[Role::Admin])
            .require_roles("/admin/audit-logs", &[Role::Admin])
    }

    pub fn require_authenticated(mut self, prefix: &str) -> Self {
        self.rules.push(PathRule {
            prefix: prefix.to_string(),
            guard: RouteGuard::AuthenticatedOnly,
        });
        self
    }

    pub fn require_roles(mut self, prefix: &str, roles: &[Role]) -> Self {
        self.rules.push(PathRule {
            prefix: prefix.to_string(),
            guard: RouteGuard::RoleIn(roles.to_vec()),
        });
        self
    }

    /// Whether any rule applies to the path.
    pub fn is_protected(&self, path: &str) -> bool {
        self.matching_rule(path).is_some()
    }

    fn matching_rule(&self, path: &str) -> Option<&PathRule> {
        self.rules
            .iter()
            .filter(|rule| path.starts_with(&rule.prefix))
            .max_by_key(|rule| rule.prefix.len())
    }

    /// Decide access for an identity (or none) on a path. Pure: the outcome
    /// depends only on the rule set and the arguments.
    pub fn evaluate(&self, identity: Option<&SessionIdentity>, path: &str) -> AccessDecision {
        let rule = match self.matching_rule(path) {
            Some(rule) => rule,
            None => return AccessDecision::Allow,
        };

        let identity = match identity {
            Some(identity) => identity,
            None => return AccessDecision::RedirectToSignIn,
        };

        match &rule.guard {
            RouteGuard::AuthenticatedOnly => AccessDecision::Allow,
            RouteGuard::RoleIn(roles) => {
                if roles.contains(&identity.role) {
                    AccessDecision::Allow
                } else {
                    AccessDecision::RedirectToAccessDenied
                }
            }
        }
    }
}
