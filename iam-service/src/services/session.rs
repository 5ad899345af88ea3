//! Stateless session resolution.
//!
//! The auth provider issues a signed session cookie of the form
//! `base64url(payload).base64url(tag)` where the payload is a JSON object
//! carrying the user id and role, and the tag is HMAC-SHA256 over the encoded
//! payload, keyed with the shared session secret. Resolution never touches
//! the store; any absent, malformed or forged cookie yields `None`.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::models::Role;

type HmacSha256 = Hmac<Sha256>;

/// The authenticated subject of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionPayload {
    user_id: Uuid,
    role: Option<String>,
}

#[derive(Clone)]
pub struct SessionResolver {
    cookie_name: String,
    key: Vec<u8>,
}

impl SessionResolver {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            cookie_name: config.cookie_name.clone(),
            key: config.secret.as_bytes().to_vec(),
        }
    }

    /// Resolve the session identity from request headers.
    ///
    /// "No session" and "invalid session" are indistinguishable to callers.
    pub fn resolve(&self, headers: &HeaderMap) -> Option<SessionIdentity> {
        let jar = CookieJar::from_headers(headers);
        let raw = jar.get(&self.cookie_name)?.value().to_string();
        self.decode(&raw)
    }

    fn decode(&self, raw: &str) -> Option<SessionIdentity> {
        let (payload_b64, tag_b64) = raw.split_once('.')?;

        let tag = URL_SAFE_NO_PAD.decode(tag_b64).ok()?;
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(payload_b64.as_bytes());
        let expected = mac.finalize().into_bytes();
        if expected.len() != tag.len() {
            return None;
        }
        if !bool::from(expected.as_slice().ct_eq(&tag)) {
            return None;
        }

        let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let payload: SessionPayload = serde_json::from_slice(&payload).ok()?;

        Some(SessionIdentity {
            user_id: payload.user_id,
            role: Role::from_external(payload.role.as_deref().unwrap_or("user")),
        })
    }

    /// Encode a session cookie value the way the auth provider does.
    /// Used by tests and local tooling to mint sessions.
    pub fn encode(&self, user_id: Uuid, role: Role) -> String {
        let payload = SessionPayload {
            user_id,
            role: Some(role.as_str().to_string()),
        };
        let payload_b64 = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&payload).expect("session payload serialization cannot fail"),
        );
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(payload_b64.as_bytes());
        let tag_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{}.{}", payload_b64, tag_b64)
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }
}
