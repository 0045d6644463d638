//! Authentication routes: login, registration, logout

use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::AppState;
use crate::error::{WebError, WebResult};
use crate::gatekeeper::ClientIp;
use crate::login_throttle::ThrottleOutcome;
use crate::models::NewUser;
use crate::repositories::user::is_unique_violation;
use crate::response;
use crate::session::{self, CurrentUser, SessionData, SessionStore};
use crate::validation::{normalize_email, validate_login, validate_registration};

/// Login payload
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Registration payload
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// POST /auth/login
///
/// Runs the attempt throttle before touching credentials: a locked key is
/// rejected with the remaining lockout time and without another counted
/// attempt. Failed verification answers with the attempts left; success
/// clears the counter and binds a fresh session.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> WebResult<Response> {
    let wants_json = response::prefers_json(&headers);
    let sid = jar
        .get(session::SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());
    let session_id = sid.as_deref().filter(|sid| session::is_valid_id(sid));

    validate_login(&payload.email, &payload.password).map_err(WebError::Validation)?;

    let remaining_attempts = match state.login_throttle.record_attempt(&ip, session_id).await {
        ThrottleOutcome::Locked { remaining_secs } => {
            warn!(
                "Login locked out for {} ({}s remaining)",
                ip, remaining_secs
            );
            return Err(WebError::TooManyAttempts { remaining_secs });
        }
        ThrottleOutcome::Counted { remaining_attempts } => remaining_attempts,
    };

    let user = match state
        .verifier
        .verify(&payload.email, &payload.password)
        .await
    {
        Ok(user) => user,
        Err(WebError::InvalidCredentials { .. }) => {
            info!("Failed login attempt from {}", ip);
            if wants_json {
                return Err(WebError::InvalidCredentials {
                    remaining_attempts: Some(remaining_attempts),
                });
            }
            return Ok(Redirect::to("/login?error=invalid").into_response());
        }
        Err(err) => return Err(err),
    };

    state.login_throttle.clear(&ip, session_id).await;

    // A login always issues a fresh session id; the anonymous session is
    // destroyed after its return_to is migrated.
    let return_to = match session_id {
        Some(old_sid) => {
            let previous = state.sessions.get(old_sid).await.ok().flatten();
            if let Err(e) = state.sessions.destroy(old_sid).await {
                error!("Failed to destroy session {}: {:#}", old_sid, e);
            }
            previous.and_then(|data| data.return_to)
        }
        None => None,
    };

    let new_sid = SessionStore::create_id();
    let data = SessionData {
        user_id: Some(user.id),
        return_to: None,
    };
    state
        .sessions
        .set(&new_sid, &data, payload.remember_me)
        .await?;

    info!("User {} logged in", user.id);

    let mut resp = if wants_json {
        response::ok_with("Login successful", json!({ "user": user })).into_response()
    } else {
        Redirect::to(return_to.as_deref().unwrap_or("/")).into_response()
    };

    if let Ok(value) = HeaderValue::from_str(&state.sessions.cookie(&new_sid, payload.remember_me))
    {
        resp.headers_mut().append(header::SET_COOKIE, value);
    }

    Ok(resp)
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> WebResult<impl IntoResponse> {
    validate_registration(
        &payload.name,
        &payload.email,
        &payload.password,
        &payload.confirm_password,
    )
    .map_err(WebError::Validation)?;

    let email = normalize_email(&payload.email);

    if state.users.find_by_email(&email).await?.is_some() {
        return Err(WebError::Conflict("Email already in use".to_string()));
    }

    let new_user = NewUser {
        name: payload.name.trim().to_string(),
        email,
        password: payload.password,
        role: "user".to_string(),
        permissions: None,
    };

    let user_id = match state.users.create(&new_user).await {
        Ok(id) => id,
        // The pre-check raced with a concurrent registration.
        Err(err) if is_unique_violation(&err) => {
            return Err(WebError::Conflict("Email already in use".to_string()));
        }
        Err(err) => return Err(err.into()),
    };

    info!("User {} registered", user_id);

    Ok(response::ok_with(
        "Registration successful",
        json!({ "user_id": user_id }),
    ))
}

/// GET /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    let Some(user) = user else {
        return Redirect::to("/").into_response();
    };

    if let Some(cookie) = jar.get(session::SESSION_COOKIE) {
        if let Err(e) = state.sessions.destroy(cookie.value()).await {
            error!("Failed to destroy session for user {}: {:#}", user.id, e);
        }
    }

    info!("User {} logged out", user.id);

    let mut resp = Redirect::to("/login").into_response();
    if let Ok(value) = HeaderValue::from_str(&state.sessions.clear_cookie()) {
        resp.headers_mut().append(header::SET_COOKIE, value);
    }
    resp
}
