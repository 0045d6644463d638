//! Router assembly and shared route helpers

pub mod auth;
pub mod posts;
pub mod users;

use axum::{
    Json, Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::{
    AppState, authorizer,
    error::WebError,
    gatekeeper, rate_limiter, response,
};

/// Pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Resolve page/limit/offset from the query with the usual clamps
pub fn page_params(query: &PageQuery) -> (i64, i64, i64) {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    (page, limit, (page - 1) * limit)
}

/// Pagination envelope fragment
pub fn pagination(total: i64, page: i64, limit: i64) -> Value {
    json!({
        "total": total,
        "page": page,
        "limit": limit,
        "total_pages": if limit > 0 { (total + limit - 1) / limit } else { 0 },
    })
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let admin_users = Router::new()
        .route("/users", get(users::list_users))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            |state: State<AppState>, req: Request, next: Next| {
                authorizer::require_permission(state, &["read:users"], req, next)
            },
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            |state: State<AppState>, req: Request, next: Next| {
                authorizer::require_role(state, &["admin"], req, next)
            },
        ));

    let user_detail = Router::new()
        .route("/users/:id", get(users::get_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            |state: State<AppState>, req: Request, next: Next| {
                authorizer::require_permission(state, &["read:users"], req, next)
            },
        ));

    let posts_read = Router::new()
        .route("/posts", get(posts::list_posts))
        .route("/posts/:id", get(posts::get_post))
        .route("/posts/user/:user_id", get(posts::list_user_posts));

    let posts_create = Router::new()
        .route("/posts", post(posts::create_post))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            |state: State<AppState>, req: Request, next: Next| {
                authorizer::require_permission(state, &["create:posts"], req, next)
            },
        ));

    let posts_update = Router::new()
        .route("/posts/:id", put(posts::update_post))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            |state: State<AppState>, req: Request, next: Next| {
                authorizer::require_permission(state, &["update:posts"], req, next)
            },
        ));

    let posts_delete = Router::new()
        .route("/posts/:id", delete(posts::delete_post))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            |state: State<AppState>, req: Request, next: Next| {
                authorizer::require_permission(state, &["delete:posts"], req, next)
            },
        ));

    Router::new()
        .route("/", get(index))
        .route("/login", get(login_page))
        .route("/health", get(health))
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/logout", get(auth::logout))
        .merge(admin_users)
        .merge(user_detail)
        .merge(posts_read)
        .merge(posts_create)
        .merge(posts_update)
        .merge(posts_delete)
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    rate_limiter::rate_limit_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    gatekeeper::gatekeeper,
                )),
        )
        .with_state(state)
}

/// Landing page stub; view rendering lives outside this service
pub async fn index() -> impl IntoResponse {
    response::ok("Welcome")
}

/// Login page stub
pub async fn login_page() -> impl IntoResponse {
    response::ok("Login page")
}

/// Liveness probe covering the database and the session store
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = common::database::health_check(&state.db_pool)
        .await
        .unwrap_or(false);
    let session_store = state.sessions.health_check().await.unwrap_or(false);
    let status = if database && session_store { "ok" } else { "degraded" };

    Json(json!({
        "status": status,
        "database": database,
        "session_store": session_store,
    }))
}

/// Top-level 404 handler
pub async fn not_found(req: Request) -> impl IntoResponse {
    error!("404 Not Found: {}", req.uri());
    WebError::NotFound("Not Found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_defaults_and_clamps() {
        let (page, limit, offset) = page_params(&PageQuery {
            page: None,
            limit: None,
        });
        assert_eq!((page, limit, offset), (1, 10, 0));

        let (page, limit, offset) = page_params(&PageQuery {
            page: Some(3),
            limit: Some(20),
        });
        assert_eq!((page, limit, offset), (3, 20, 40));

        let (page, limit, _) = page_params(&PageQuery {
            page: Some(0),
            limit: Some(1000),
        });
        assert_eq!((page, limit), (1, 100));
    }

    #[test]
    fn test_pagination_rounds_total_pages_up() {
        assert_eq!(pagination(0, 1, 10)["total_pages"], 0);
        assert_eq!(pagination(10, 1, 10)["total_pages"], 1);
        assert_eq!(pagination(11, 1, 10)["total_pages"], 2);
    }
}
