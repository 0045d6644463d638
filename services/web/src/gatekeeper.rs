//! Admission control for every inbound request
//!
//! Decides per request whether to pass it through, redirect the client to
//! login (or home), or reject it outright. The decision itself is a pure
//! function over the request facts so it can be exercised without a
//! session store behind it.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Extensions, HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use std::net::SocketAddr;
use tracing::{error, warn};

use crate::AppState;
use crate::config::AppConfig;
use crate::error::WebError;
use crate::response::prefers_json;
use crate::session::{self, CurrentUser, SessionStore};

/// Client IP derived once per request and shared down the pipeline
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

/// Admission decision for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Pass the request to the next stage
    Allow,
    /// Already authenticated on the login page; send the client home
    RedirectHome,
    /// Unauthenticated machine client; reject with 401
    Reject,
    /// Unauthenticated browser client; remember the requested URL and
    /// redirect to the login page
    RedirectToLogin,
}

/// Derive the client IP: proxy headers first, then the raw peer address
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    {
        return real_ip.to_string();
    }

    if let Some(info) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return info.0.ip().to_string();
    }

    "unknown".to_string()
}

/// Decide admission for a request.
///
/// The already-authenticated `/login` check runs before the public-path
/// allow; `/login` is itself public, so the reverse order would make the
/// redirect unreachable. The ip allow-list only ever applies to public
/// paths: a non-public, non-allow-listed request never reaches that branch.
pub fn admit(
    config: &AppConfig,
    path: &str,
    ip: &str,
    authenticated: bool,
    wants_json: bool,
) -> Admission {
    if config.dev_mode {
        return Admission::Allow;
    }

    let path = path.split('?').next().unwrap_or(path);

    if path == "/login" && authenticated {
        return Admission::RedirectHome;
    }

    let is_public = path.is_empty()
        || path == "/"
        || config
            .public_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()));

    let ip_allowed = config.allowed_ips.iter().any(|allowed| allowed == "*")
        || config.allowed_ips.iter().any(|allowed| allowed == ip);

    if is_public && ip_allowed {
        return Admission::Allow;
    }

    if !authenticated {
        if wants_json {
            return Admission::Reject;
        }
        return Admission::RedirectToLogin;
    }

    Admission::Allow
}

/// Middleware wrapping [`admit`] with session resolution and the
/// `return_to` bookkeeping
pub async fn gatekeeper(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let sid = jar
        .get(session::SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    let user = match sid.as_deref() {
        Some(sid) => state.sessions.authenticate(&state.users, sid).await,
        None => None,
    };

    let path = req.uri().path().to_string();
    let ip = client_ip(req.headers(), req.extensions());
    let wants_json = prefers_json(req.headers());
    let decision = admit(&state.config, &path, &ip, user.is_some(), wants_json);

    req.extensions_mut().insert(ClientIp(ip.clone()));
    req.extensions_mut().insert(CurrentUser(user));

    match decision {
        Admission::Allow => next.run(req).await,
        Admission::RedirectHome => Redirect::to("/").into_response(),
        Admission::Reject => {
            warn!(
                "No authentication information: {} {} from {}",
                req.method(),
                path,
                ip
            );
            WebError::Unauthorized.into_response()
        }
        Admission::RedirectToLogin => {
            warn!(
                "Unauthenticated request to {} from {}, redirecting to login",
                path, ip
            );

            // Remember the originally requested URL on the session so the
            // login handler can send the client back there.
            let original_url = req.uri().to_string();
            let sid = sid
                .filter(|sid| session::is_valid_id(sid))
                .unwrap_or_else(SessionStore::create_id);

            let mut data = state.sessions.get(&sid).await.ok().flatten().unwrap_or_default();
            data.return_to = Some(original_url);
            if let Err(e) = state.sessions.set(&sid, &data, false).await {
                error!("Failed to store session {}: {:#}", sid, e);
            }

            let mut response = Redirect::to("/login?error=unauthorized").into_response();
            if let Ok(value) = HeaderValue::from_str(&state.sessions.cookie(&sid, false)) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            bind_addr: "0.0.0.0:3000".to_string(),
            dev_mode: false,
            public_paths: vec![
                "/login".to_string(),
                "/auth/login".to_string(),
                "/auth/logout".to_string(),
                "/auth/register".to_string(),
                "/stylesheets/".to_string(),
            ],
            allowed_ips: vec!["*".to_string()],
        }
    }

    #[test]
    fn test_dev_mode_admits_everything() {
        let config = AppConfig {
            dev_mode: true,
            ..config()
        };

        assert_eq!(
            admit(&config, "/users", "9.9.9.9", false, true),
            Admission::Allow
        );
    }

    #[test]
    fn test_public_paths_admit_anonymous_clients() {
        let config = config();

        assert_eq!(admit(&config, "/", "1.1.1.1", false, true), Admission::Allow);
        assert_eq!(admit(&config, "", "1.1.1.1", false, true), Admission::Allow);
        assert_eq!(
            admit(&config, "/auth/login", "1.1.1.1", false, true),
            Admission::Allow
        );
        assert_eq!(
            admit(&config, "/stylesheets/site.css", "1.1.1.1", false, false),
            Admission::Allow
        );
    }

    #[test]
    fn test_unauthenticated_json_client_is_rejected() {
        assert_eq!(
            admit(&config(), "/users", "1.1.1.1", false, true),
            Admission::Reject
        );
    }

    #[test]
    fn test_unauthenticated_browser_is_redirected_to_login() {
        assert_eq!(
            admit(&config(), "/users", "1.1.1.1", false, false),
            Admission::RedirectToLogin
        );
    }

    #[test]
    fn test_authenticated_request_to_login_goes_home() {
        assert_eq!(
            admit(&config(), "/login", "1.1.1.1", true, false),
            Admission::RedirectHome
        );
        // The query string does not change the outcome.
        assert_eq!(
            admit(&config(), "/login?error=unauthorized", "1.1.1.1", true, false),
            Admission::RedirectHome
        );
    }

    #[test]
    fn test_authenticated_request_to_private_path_is_allowed() {
        assert_eq!(
            admit(&config(), "/users/7", "1.1.1.1", true, true),
            Admission::Allow
        );
    }

    #[test]
    fn test_restricted_ip_list_gates_public_paths() {
        let config = AppConfig {
            allowed_ips: vec!["10.0.0.1".to_string()],
            ..config()
        };

        assert_eq!(
            admit(&config, "/auth/login", "10.0.0.1", false, true),
            Admission::Allow
        );
        // A public path from an unlisted ip falls through to the
        // authentication check instead.
        assert_eq!(
            admit(&config, "/auth/login", "10.0.0.2", false, true),
            Admission::Reject
        );
        // A non-public path never consults the ip list.
        assert_eq!(
            admit(&config, "/users", "10.0.0.1", false, true),
            Admission::Reject
        );
    }

    #[test]
    fn test_client_ip_prefers_proxy_headers() {
        let mut headers = HeaderMap::new();
        let extensions = Extensions::new();

        assert_eq!(client_ip(&headers, &extensions), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("10.1.1.1"));
        assert_eq!(client_ip(&headers, &extensions), "10.1.1.1");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.1.1.1"),
        );
        assert_eq!(client_ip(&headers, &extensions), "203.0.113.9");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer_address() {
        let headers = HeaderMap::new();
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 5], 41000))));

        assert_eq!(client_ip(&headers, &extensions), "192.168.1.5");
    }
}
