//! Session storage and authentication state
//!
//! Sessions are JSON records in Redis under `session:{sid}` with a TTL.
//! The authenticated user is never cached: every request re-fetches the
//! user row by the id stored in the session and fails closed to anonymous
//! when it no longer resolves.

use anyhow::Result;
use common::cache::RedisPool;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

use crate::models::User;
use crate::repositories::UserRepository;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "sid";

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session lifetime in seconds
    pub ttl_seconds: u64,
    /// Session lifetime when "remember me" is set at login
    pub remember_ttl_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 12 * 60 * 60,
            remember_ttl_seconds: 30 * 24 * 60 * 60,
        }
    }
}

impl SessionConfig {
    /// Create a new SessionConfig from environment variables
    ///
    /// # Environment Variables
    /// - `SESSION_TTL_SECONDS`: session lifetime (default: 43200, 12 hours)
    /// - `SESSION_REMEMBER_TTL_SECONDS`: lifetime with "remember me"
    ///   (default: 2592000, 30 days)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ttl_seconds = std::env::var("SESSION_TTL_SECONDS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(defaults.ttl_seconds);

        let remember_ttl_seconds = std::env::var("SESSION_REMEMBER_TTL_SECONDS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(defaults.remember_ttl_seconds);

        Self {
            ttl_seconds,
            remember_ttl_seconds,
        }
    }
}

/// State attached to a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    /// Authenticated user, if any; anonymous sessions only carry `return_to`
    pub user_id: Option<i64>,
    /// URL to return to after login
    pub return_to: Option<String>,
}

/// Authenticated identity resolved from a session, with the permission set
/// decoded once per request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub permissions: HashSet<String>,
}

impl AuthUser {
    /// Build the per-request identity from a user row
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            permissions: user
                .permissions
                .as_ref()
                .map(|perms| perms.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }
}

/// The request's resolved identity, inserted into request extensions by the
/// gatekeeper for every admitted request
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<AuthUser>);

/// True when the value looks like a session id this service issued
pub fn is_valid_id(sid: &str) -> bool {
    Uuid::parse_str(sid).is_ok()
}

/// Redis-backed session store
#[derive(Clone)]
pub struct SessionStore {
    redis: RedisPool,
    config: SessionConfig,
}

impl SessionStore {
    /// Create a new session store
    pub fn new(redis: RedisPool, config: SessionConfig) -> Self {
        Self { redis, config }
    }

    /// Generate a fresh session id
    pub fn create_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn key(sid: &str) -> String {
        format!("session:{sid}")
    }

    /// Fetch session state; unknown, expired, or undecodable sessions all
    /// come back as `None`
    pub async fn get(&self, sid: &str) -> Result<Option<SessionData>> {
        if !is_valid_id(sid) {
            return Ok(None);
        }

        let raw = self.redis.get(&Self::key(sid)).await?;

        Ok(raw.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Discarding undecodable session {}: {}", sid, e);
                None
            }
        }))
    }

    /// Store session state, refreshing the TTL
    pub async fn set(&self, sid: &str, data: &SessionData, remember: bool) -> Result<()> {
        let ttl = if remember {
            self.config.remember_ttl_seconds
        } else {
            self.config.ttl_seconds
        };

        let raw = serde_json::to_string(data)?;
        self.redis.set(&Self::key(sid), &raw, Some(ttl)).await
    }

    /// Destroy a session
    pub async fn destroy(&self, sid: &str) -> Result<()> {
        self.redis.delete(&Self::key(sid)).await
    }

    /// Resolve the authenticated user bound to a session.
    ///
    /// Fails closed: any store error, missing session, or dangling user id
    /// yields anonymous.
    pub async fn authenticate(&self, users: &UserRepository, sid: &str) -> Option<AuthUser> {
        let data = match self.get(sid).await {
            Ok(data) => data?,
            Err(e) => {
                warn!("Session lookup failed for {}: {:#}", sid, e);
                return None;
            }
        };

        let user_id = data.user_id?;

        match users.find_by_id(user_id).await {
            Ok(Some(user)) => Some(AuthUser::from_user(&user)),
            Ok(None) => {
                warn!("Session {} references missing user {}", sid, user_id);
                None
            }
            Err(e) => {
                warn!("User lookup failed for session {}: {:#}", sid, e);
                None
            }
        }
    }

    /// Session cookie header value for a login or session refresh
    pub fn cookie(&self, sid: &str, remember: bool) -> String {
        let max_age = if remember {
            self.config.remember_ttl_seconds
        } else {
            self.config.ttl_seconds
        };

        format!("{SESSION_COOKIE}={sid}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}")
    }

    /// Cookie header value that clears the session cookie
    pub fn clear_cookie(&self) -> String {
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }

    /// Check the backing store is reachable
    pub async fn health_check(&self) -> Result<bool> {
        self.redis.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(role: &str, permissions: Option<Vec<&str>>) -> User {
        User {
            id: 7,
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            role: role.to_string(),
            permissions: permissions.map(|perms| {
                perms.into_iter().map(|p| p.to_string()).collect()
            }),
            profile_image: None,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_session_ids_are_valid_uuids() {
        let sid = SessionStore::create_id();
        assert!(is_valid_id(&sid));
        assert!(!is_valid_id("not-a-session"));
        assert!(!is_valid_id(""));
    }

    #[test]
    fn test_auth_user_decodes_permission_set_once() {
        let auth = AuthUser::from_user(&user("user", Some(vec!["read:users", "create:posts"])));
        assert!(auth.permissions.contains("read:users"));
        assert!(auth.permissions.contains("create:posts"));
        assert!(!auth.permissions.contains("delete:posts"));

        let no_perms = AuthUser::from_user(&user("user", None));
        assert!(no_perms.permissions.is_empty());
    }

    #[tokio::test]
    async fn test_cookie_max_age_tracks_remember_flag() {
        // Client construction only parses the URL; no server is needed.
        let redis = RedisPool::new(&common::cache::RedisConfig {
            url: "redis://localhost:6379".to_string(),
        })
        .await
        .unwrap();
        let store = SessionStore::new(redis, SessionConfig::default());

        let cookie = store.cookie("abc", false);
        let remembered = store.cookie("abc", true);

        assert!(cookie.starts_with("sid=abc; "));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=43200"));
        assert!(remembered.contains("Max-Age=2592000"));
        assert!(store.clear_cookie().contains("Max-Age=0"));
    }

    #[test]
    fn test_session_data_round_trips_as_json() {
        let data = SessionData {
            user_id: Some(42),
            return_to: Some("/posts?page=2".to_string()),
        };

        let raw = serde_json::to_string(&data).unwrap();
        let parsed: SessionData = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.user_id, Some(42));
        assert_eq!(parsed.return_to.as_deref(), Some("/posts?page=2"));
    }
}
