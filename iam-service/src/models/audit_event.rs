//! Audit event model - security and compliance logging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the actor authenticated (or attempted to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    EmailPassword,
    Google,
    Github,
    MagicLink,
    TwoFactor,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::EmailPassword => "email_password",
            AuthMethod::Google => "google",
            AuthMethod::Github => "github",
            AuthMethod::MagicLink => "magic_link",
            AuthMethod::TwoFactor => "two_factor",
        }
    }

    /// Infer the auth method from hints in an auth-provider route path.
    pub fn from_path_hint(path: &str) -> Self {
        if path.contains("google") {
            AuthMethod::Google
        } else if path.contains("github") {
            AuthMethod::Github
        } else if path.contains("magic") {
            AuthMethod::MagicLink
        } else if path.contains("2fa") || path.contains("two-factor") {
            AuthMethod::TwoFactor
        } else {
            AuthMethod::EmailPassword
        }
    }
}

impl std::str::FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_password" => Ok(AuthMethod::EmailPassword),
            "google" => Ok(AuthMethod::Google),
            "github" => Ok(AuthMethod::Github),
            "magic_link" => Ok(AuthMethod::MagicLink),
            "two_factor" => Ok(AuthMethod::TwoFactor),
            _ => Err(format!("Invalid auth method: {}", s)),
        }
    }
}

/// Audit event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LoginSuccess,
    LoginFailure,
    Logout,
    Register,
    PasswordReset,
    AccessDenied,
    RoleChange,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::LoginSuccess => "login_success",
            EventType::LoginFailure => "login_failure",
            EventType::Logout => "logout",
            EventType::Register => "register",
            EventType::PasswordReset => "password_reset",
            EventType::AccessDenied => "access_denied",
            EventType::RoleChange => "role_change",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login_success" => Ok(EventType::LoginSuccess),
            "login_failure" => Ok(EventType::LoginFailure),
            "logout" => Ok(EventType::Logout),
            "register" => Ok(EventType::Register),
            "password_reset" => Ok(EventType::PasswordReset),
            "access_denied" => Ok(EventType::AccessDenied),
            "role_change" => Ok(EventType::RoleChange),
            _ => Err(format!("Invalid event type: {}", s)),
        }
    }
}

/// Audit event entity. Append-only; never mutated or deleted here.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub auth_method: AuthMethod,
    pub event_type: EventType,
    pub event_details: String,
    pub success: bool,
    pub response_time_ms: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Option<Uuid>,
        ip_address: Option<String>,
        user_agent: Option<String>,
        auth_method: AuthMethod,
        event_type: EventType,
        event_details: String,
        success: bool,
        response_time_ms: Option<i64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            ip_address,
            user_agent,
            auth_method,
            event_type,
            event_details,
            success,
            response_time_ms,
            timestamp: Utc::now(),
        }
    }

    /// Create a role-change event for an administrative action.
    pub fn role_change(actor_user_id: Uuid, details: serde_json::Value) -> Self {
        Self::new(
            Some(actor_user_id),
            None,
            None,
            AuthMethod::EmailPassword,
            EventType::RoleChange,
            details.to_string(),
            true,
            None,
        )
    }
}

/// Audit-log viewer row: the event joined with the actor's current name.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub auth_method: AuthMethod,
    pub event_type: EventType,
    pub event_details: String,
    pub success: bool,
    pub response_time_ms: Option<i64>,
    pub timestamp: DateTime<Utc>,
}
