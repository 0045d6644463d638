//! Role and permission checks layered on authenticated sessions
//!
//! Applied per route after the gatekeeper. Both checks skip under the
//! development override and answer 401/403 with the same JSON-or-HTML
//! split as the gatekeeper.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::warn;

use crate::AppState;
use crate::error::WebError;
use crate::response::{error_page, prefers_json};
use crate::session::{AuthUser, CurrentUser};

const INSUFFICIENT_PERMISSIONS: &str = "Forbidden: Insufficient permissions";

fn current_user(req: &Request) -> Option<AuthUser> {
    req.extensions()
        .get::<CurrentUser>()
        .and_then(|current| current.0.clone())
}

/// Decide a role gate
pub fn authorize_role(user: Option<&AuthUser>, roles: &[&str]) -> Result<(), WebError> {
    let Some(user) = user else {
        return Err(WebError::Unauthorized);
    };

    if roles.contains(&user.role.as_str()) {
        Ok(())
    } else {
        Err(WebError::Forbidden(INSUFFICIENT_PERMISSIONS.to_string()))
    }
}

/// Decide a permission gate; any overlap with the session's decoded
/// permission set passes
pub fn authorize_permission(
    user: Option<&AuthUser>,
    permissions: &[&str],
) -> Result<(), WebError> {
    let Some(user) = user else {
        return Err(WebError::Unauthorized);
    };

    if permissions
        .iter()
        .any(|permission| user.permissions.contains(*permission))
    {
        Ok(())
    } else {
        Err(WebError::Forbidden(INSUFFICIENT_PERMISSIONS.to_string()))
    }
}

fn deny(err: WebError, wants_json: bool) -> Response {
    match &err {
        WebError::Unauthorized if !wants_json => {
            Redirect::to("/login?error=unauthorized").into_response()
        }
        WebError::Forbidden(message) if !wants_json => {
            error_page(StatusCode::FORBIDDEN, message).into_response()
        }
        _ => err.into_response(),
    }
}

/// Middleware requiring one of the given roles
pub async fn require_role(
    State(state): State<AppState>,
    roles: &'static [&'static str],
    req: Request,
    next: Next,
) -> Response {
    if state.config.dev_mode {
        return next.run(req).await;
    }

    let wants_json = prefers_json(req.headers());
    let user = current_user(&req);

    match authorize_role(user.as_ref(), roles) {
        Ok(()) => next.run(req).await,
        Err(err) => {
            match &user {
                Some(user) => warn!(
                    "Authorization failed: user {} with role {} requires one of {:?}",
                    user.id, user.role, roles
                ),
                None => warn!("Authorization failed: no authenticated user"),
            }
            deny(err, wants_json)
        }
    }
}

/// Middleware requiring one of the given permissions
pub async fn require_permission(
    State(state): State<AppState>,
    permissions: &'static [&'static str],
    req: Request,
    next: Next,
) -> Response {
    if state.config.dev_mode {
        return next.run(req).await;
    }

    let wants_json = prefers_json(req.headers());
    let user = current_user(&req);

    match authorize_permission(user.as_ref(), permissions) {
        Ok(()) => next.run(req).await,
        Err(err) => {
            match &user {
                Some(user) => warn!(
                    "Authorization failed: user {} requires one of permissions {:?}",
                    user.id, permissions
                ),
                None => warn!("Authorization failed: no authenticated user"),
            }
            deny(err, wants_json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn auth_user(role: &str, permissions: &[&str]) -> AuthUser {
        AuthUser {
            id: 7,
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            role: role.to_string(),
            permissions: permissions
                .iter()
                .map(|p| p.to_string())
                .collect::<HashSet<_>>(),
        }
    }

    #[test]
    fn test_role_check_rejects_unauthenticated() {
        assert!(matches!(
            authorize_role(None, &["admin"]),
            Err(WebError::Unauthorized)
        ));
    }

    #[test]
    fn test_role_check_rejects_wrong_role() {
        let user = auth_user("user", &[]);
        assert!(matches!(
            authorize_role(Some(&user), &["admin"]),
            Err(WebError::Forbidden(_))
        ));
    }

    #[test]
    fn test_admin_role_passes_regardless_of_permission_set() {
        let admin = auth_user("admin", &[]);
        assert!(authorize_role(Some(&admin), &["admin"]).is_ok());

        let admin_with_perms = auth_user("admin", &["read:users"]);
        assert!(authorize_role(Some(&admin_with_perms), &["admin"]).is_ok());
    }

    #[test]
    fn test_role_check_accepts_any_listed_role() {
        let editor = auth_user("editor", &[]);
        assert!(authorize_role(Some(&editor), &["admin", "editor"]).is_ok());
    }

    #[test]
    fn test_permission_check_rejects_unauthenticated() {
        assert!(matches!(
            authorize_permission(None, &["read:users"]),
            Err(WebError::Unauthorized)
        ));
    }

    #[test]
    fn test_permission_check_requires_overlap() {
        let user = auth_user("user", &["read:posts"]);
        assert!(matches!(
            authorize_permission(Some(&user), &["read:users"]),
            Err(WebError::Forbidden(_))
        ));

        let reader = auth_user("user", &["read:users", "read:posts"]);
        assert!(authorize_permission(Some(&reader), &["read:users"]).is_ok());

        // Any overlap is enough.
        assert!(authorize_permission(Some(&reader), &["read:users", "write:users"]).is_ok());
    }
}
