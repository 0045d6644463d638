//! Post routes

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::error::{WebError, WebResult};
use crate::response;
use crate::routes::{PageQuery, page_params, pagination};
use crate::session::CurrentUser;
use crate::validation::validate_post;

/// Post creation/update payload
#[derive(Debug, Deserialize)]
pub struct PostPayload {
    pub title: String,
    pub content: String,
}

/// GET /posts - list posts with pagination
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> WebResult<impl IntoResponse> {
    let (page, limit, offset) = page_params(&query);

    let (posts, total) = tokio::try_join!(state.posts.list(limit, offset), state.posts.count())?;

    Ok(response::ok_with(
        "Posts retrieved successfully",
        json!({
            "posts": posts,
            "pagination": pagination(total, page, limit),
        }),
    ))
}

/// GET /posts/:id - fetch one post
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> WebResult<impl IntoResponse> {
    let post = state
        .posts
        .find_by_id(id)
        .await?
        .ok_or_else(|| WebError::NotFound("Post not found".to_string()))?;

    Ok(response::ok_with("Post retrieved successfully", json!(post)))
}

/// GET /posts/user/:user_id - list one user's posts
pub async fn list_user_posts(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> WebResult<impl IntoResponse> {
    let (page, limit, offset) = page_params(&query);

    let (posts, total) = tokio::try_join!(
        state.posts.list_by_user(user_id, limit, offset),
        state.posts.count_by_user(user_id)
    )?;

    Ok(response::ok_with(
        "Posts retrieved successfully",
        json!({
            "posts": posts,
            "pagination": pagination(total, page, limit),
        }),
    ))
}

/// POST /posts - create a post owned by the current user
pub async fn create_post(
    State(state): State<AppState>,
    Extension(CurrentUser(current)): Extension<CurrentUser>,
    Json(payload): Json<PostPayload>,
) -> WebResult<impl IntoResponse> {
    let Some(user) = current else {
        return Err(WebError::Unauthorized);
    };

    validate_post(&payload.title, &payload.content).map_err(WebError::Validation)?;

    let post_id = state
        .posts
        .create(user.id, payload.title.trim(), &payload.content)
        .await?;

    let post = state
        .posts
        .find_by_id(post_id)
        .await?
        .ok_or_else(|| WebError::NotFound("Post not found".to_string()))?;

    Ok(response::ok_with("Post created successfully", json!(post)))
}

/// PUT /posts/:id - update a post; author or admin only
pub async fn update_post(
    State(state): State<AppState>,
    Extension(CurrentUser(current)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<PostPayload>,
) -> WebResult<impl IntoResponse> {
    validate_post(&payload.title, &payload.content).map_err(WebError::Validation)?;

    let post = state
        .posts
        .find_by_id(id)
        .await?
        .ok_or_else(|| WebError::NotFound("Post not found".to_string()))?;

    if let Some(current) = &current {
        if current.role != "admin" && post.user_id != current.id {
            return Err(WebError::Forbidden(
                "Forbidden: You do not have permission to update this post".to_string(),
            ));
        }
    }

    state
        .posts
        .update(id, payload.title.trim(), &payload.content)
        .await?;

    let updated = state
        .posts
        .find_by_id(id)
        .await?
        .ok_or_else(|| WebError::NotFound("Post not found".to_string()))?;

    Ok(response::ok_with("Post updated successfully", json!(updated)))
}

/// DELETE /posts/:id - delete a post; author or admin only
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(CurrentUser(current)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> WebResult<impl IntoResponse> {
    let post = state
        .posts
        .find_by_id(id)
        .await?
        .ok_or_else(|| WebError::NotFound("Post not found".to_string()))?;

    if let Some(current) = &current {
        if current.role != "admin" && post.user_id != current.id {
            return Err(WebError::Forbidden(
                "Forbidden: You do not have permission to delete this post".to_string(),
            ));
        }
    }

    state.posts.delete(id).await?;

    Ok(response::ok("Post deleted successfully"))
}
