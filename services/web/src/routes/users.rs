//! User routes

use axum::{
    Extension,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::AppState;
use crate::error::{WebError, WebResult};
use crate::models::PublicUser;
use crate::response;
use crate::routes::{PageQuery, page_params, pagination};
use crate::session::CurrentUser;

/// GET /users - list users (admin only)
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> WebResult<impl IntoResponse> {
    let (page, limit, offset) = page_params(&query);

    let (users, total) = tokio::try_join!(state.users.list(limit, offset), state.users.count())?;

    Ok(response::ok_with(
        "Users retrieved successfully",
        json!({
            "users": users,
            "pagination": pagination(total, page, limit),
        }),
    ))
}

/// GET /users/:id - fetch one user; non-admins may only view themselves
pub async fn get_user(
    State(state): State<AppState>,
    Extension(CurrentUser(current)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> WebResult<impl IntoResponse> {
    if let Some(current) = &current {
        if current.role != "admin" && current.id != id {
            return Err(WebError::Forbidden(
                "Forbidden: You do not have permission to view this user".to_string(),
            ));
        }
    }

    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| WebError::NotFound("User not found".to_string()))?;

    Ok(response::ok_with(
        "User retrieved successfully",
        json!(PublicUser::from(user)),
    ))
}
