//! Post repository for database operations

use anyhow::Result;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;

use crate::models::Post;

fn post_from_row(row: &PgRow) -> Post {
    Post {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        content: row.get("content"),
        author_name: row.get("author_name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Post repository
#[derive(Clone)]
pub struct PostRepository {
    pool: PgPool,
}

impl PostRepository {
    /// Create a new post repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a post by ID, joined with its author's name
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT p.id, p.user_id, p.title, p.content, p.created_at, p.updated_at,
                   u.name AS author_name
            FROM posts p
            JOIN users u ON p.user_id = u.id
            WHERE p.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(post_from_row))
    }

    /// List posts with pagination, newest first
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.user_id, p.title, p.content, p.created_at, p.updated_at,
                   u.name AS author_name
            FROM posts p
            JOIN users u ON p.user_id = u.id
            ORDER BY p.created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(post_from_row).collect())
    }

    /// List one user's posts with pagination, newest first
    pub async fn list_by_user(&self, user_id: i64, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.user_id, p.title, p.content, p.created_at, p.updated_at,
                   u.name AS author_name
            FROM posts p
            JOIN users u ON p.user_id = u.id
            WHERE p.user_id = $1
            ORDER BY p.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(post_from_row).collect())
    }

    /// Total number of posts
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM posts")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("total"))
    }

    /// Total number of posts by one user
    pub async fn count_by_user(&self, user_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM posts WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("total"))
    }

    /// Create a post and return its id
    pub async fn create(&self, user_id: i64, title: &str, content: &str) -> Result<i64> {
        info!("Creating post for user {}", user_id);

        let row = sqlx::query(
            r#"
            INSERT INTO posts (user_id, title, content, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    /// Update a post's title and content
    pub async fn update(&self, id: i64, title: &str, content: &str) -> Result<()> {
        sqlx::query(
            "UPDATE posts SET title = $1, content = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(title)
        .bind(content)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a post
    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
