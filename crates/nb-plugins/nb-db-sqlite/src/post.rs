use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nb_core::error::{StoreError, StoreResult};
use nb_core::models::{Post, PostFilter};
use nb_core::traits::{OrderDir, PostOrderBy, PostPage, PostRepository};
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::{blob_to_uuid, uuid_to_blob};

pub struct SqlitePostRepository {
    pool: SqlitePool,
}

impl SqlitePostRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SqlitePostRepository { pool }
    }
}

fn post_from_row(row: &SqliteRow) -> StoreResult<Post> {
    let id: Vec<u8> = row.try_get("id").map_err(StoreError::backend)?;
    let author_id: Vec<u8> = row.try_get("author_id").map_err(StoreError::backend)?;
    Ok(Post {
        id: blob_to_uuid(&id)?,
        title: row.try_get("title").map_err(StoreError::backend)?,
        content: row.try_get("content").map_err(StoreError::backend)?,
        author_id: blob_to_uuid(&author_id)?,
        comments_enabled: row
            .try_get("comments_enabled")
            .map_err(StoreError::backend)?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(StoreError::backend)?,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(StoreError::backend)?,
    })
}

/// Appends `WHERE`/`AND` clauses for the filter. `prefix` qualifies column
/// names when the query joins other tables.
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PostFilter, prefix: &str) {
    let mut sep = " WHERE ";
    if let Some(author_id) = filter.author_id {
        qb.push(sep)
            .push(format!("{prefix}author_id = "))
            .push_bind(uuid_to_blob(author_id));
        sep = " AND ";
    }
    if let Some(enabled) = filter.comments_enabled {
        qb.push(sep)
            .push(format!("{prefix}comments_enabled = "))
            .push_bind(enabled);
    }
}

fn push_order_and_window(qb: &mut QueryBuilder<'_, Sqlite>, page: &PostPage, prefix: &str) {
    let column = match page.order_by {
        PostOrderBy::CreatedAt => "created_at",
        PostOrderBy::UpdatedAt => "updated_at",
        PostOrderBy::Title => "title",
    };
    let dir = match page.order_dir {
        OrderDir::Asc => "ASC",
        OrderDir::Desc => "DESC",
    };
    qb.push(format!(" ORDER BY {prefix}{column} {dir}, {prefix}id {dir}"));
    qb.push(" LIMIT ").push_bind(page.limit as i64);
    qb.push(" OFFSET ").push_bind(page.offset as i64);
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn create(&self, post: &Post) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO posts (id, title, content, author_id, comments_enabled, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(post.id))
        .bind(&post.title)
        .bind(&post.content)
        .bind(uuid_to_blob(post.author_id))
        .bind(post.comments_enabled)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Post> {
        let row = sqlx::query(
            "SELECT id, title, content, author_id, comments_enabled, created_at, updated_at \
             FROM posts WHERE id = ?",
        )
        .bind(uuid_to_blob(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        match row {
            Some(row) => post_from_row(&row),
            None => Err(StoreError::NotFound),
        }
    }

    async fn list(&self, filter: &PostFilter, page: &PostPage) -> StoreResult<Vec<Post>> {
        let mut qb = QueryBuilder::new(
            "SELECT id, title, content, author_id, comments_enabled, created_at, updated_at \
             FROM posts",
        );
        push_filter(&mut qb, filter, "");
        push_order_and_window(&mut qb, page, "");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        rows.iter().map(post_from_row).collect()
    }

    async fn count(&self, filter: &PostFilter) -> StoreResult<usize> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) AS n FROM posts");
        push_filter(&mut qb, filter, "");

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        let n: i64 = row.try_get("n").map_err(StoreError::backend)?;
        Ok(n as usize)
    }

    async fn update(&self, post: &Post) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE posts SET title = ?, content = ?, comments_enabled = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.comments_enabled)
        .bind(post.updated_at)
        .bind(uuid_to_blob(post.id))
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn exists(&self, id: Uuid) -> StoreResult<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?) AS present")
            .bind(uuid_to_blob(id))
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        row.try_get("present").map_err(StoreError::backend)
    }

    async fn list_with_comment_counts(
        &self,
        filter: &PostFilter,
        page: &PostPage,
    ) -> StoreResult<Vec<(Post, i64)>> {
        let mut qb = QueryBuilder::new(
            "SELECT p.id, p.title, p.content, p.author_id, p.comments_enabled, \
             p.created_at, p.updated_at, COUNT(c.id) AS comment_count \
             FROM posts p LEFT JOIN comments c ON c.post_id = p.id",
        );
        push_filter(&mut qb, filter, "p.");
        qb.push(" GROUP BY p.id");
        push_order_and_window(&mut qb, page, "p.");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        rows.iter()
            .map(|row| {
                let post = post_from_row(row)?;
                let count: i64 = row.try_get("comment_count").map_err(StoreError::backend)?;
                Ok((post, count))
            })
            .collect()
    }
}
