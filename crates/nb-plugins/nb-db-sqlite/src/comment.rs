use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nb_core::error::{StoreError, StoreResult};
use nb_core::models::{Comment, CommentFilter};
use nb_core::traits::{CommentOrderBy, CommentPage, CommentRepository, OrderDir};
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::{blob_to_uuid, uuid_to_blob};

const COMMENT_COLUMNS: &str =
    "id, post_id, parent_id, content, author_id, depth, created_at, updated_at";

pub struct SqliteCommentRepository {
    pool: SqlitePool,
}

impl SqliteCommentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteCommentRepository { pool }
    }

    /// The chain of ancestors from the thread root down to `id`, inclusive.
    /// Walks parent links with a recursive CTE, so the cost is the path
    /// length rather than the thread size.
    pub async fn comment_path(&self, id: Uuid) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query(
            "WITH RECURSIVE comment_path AS ( \
                 SELECT id, post_id, parent_id, content, author_id, depth, \
                        created_at, updated_at, 0 AS level \
                 FROM comments WHERE id = ? \
                 UNION ALL \
                 SELECT c.id, c.post_id, c.parent_id, c.content, c.author_id, c.depth, \
                        c.created_at, c.updated_at, p.level + 1 \
                 FROM comments c \
                 INNER JOIN comment_path p ON c.id = p.parent_id \
             ) \
             SELECT id, post_id, parent_id, content, author_id, depth, created_at, updated_at \
             FROM comment_path ORDER BY level DESC",
        )
        .bind(uuid_to_blob(id))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.iter().map(comment_from_row).collect()
    }

    /// Cursor-keyed page of a post's comment stream: everything created
    /// strictly after `after`, shallow threads first.
    pub async fn comments_after(
        &self,
        post_id: Uuid,
        after: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StoreResult<Vec<Comment>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = "
        ));
        qb.push_bind(uuid_to_blob(post_id));
        if let Some(after) = after {
            qb.push(" AND created_at > ").push_bind(after);
        }
        qb.push(" ORDER BY depth ASC, created_at ASC");
        qb.push(" LIMIT ").push_bind(limit as i64);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        rows.iter().map(comment_from_row).collect()
    }
}

fn comment_from_row(row: &SqliteRow) -> StoreResult<Comment> {
    let id: Vec<u8> = row.try_get("id").map_err(StoreError::backend)?;
    let post_id: Vec<u8> = row.try_get("post_id").map_err(StoreError::backend)?;
    let parent_id: Option<Vec<u8>> = row.try_get("parent_id").map_err(StoreError::backend)?;
    let author_id: Vec<u8> = row.try_get("author_id").map_err(StoreError::backend)?;

    Ok(Comment {
        id: blob_to_uuid(&id)?,
        post_id: blob_to_uuid(&post_id)?,
        parent_id: parent_id.as_deref().map(blob_to_uuid).transpose()?,
        content: row.try_get("content").map_err(StoreError::backend)?,
        author_id: blob_to_uuid(&author_id)?,
        depth: row.try_get("depth").map_err(StoreError::backend)?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(StoreError::backend)?,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(StoreError::backend)?,
        children: Vec::new(),
    })
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &CommentFilter) {
    let mut sep = " WHERE ";
    if let Some(post_id) = filter.post_id {
        qb.push(sep).push("post_id = ").push_bind(uuid_to_blob(post_id));
        sep = " AND ";
    }
    if let Some(parent) = &filter.parent_id {
        match parent {
            None => {
                qb.push(sep).push("parent_id IS NULL");
            }
            Some(parent_id) => {
                qb.push(sep)
                    .push("parent_id = ")
                    .push_bind(uuid_to_blob(*parent_id));
            }
        }
        sep = " AND ";
    }
    if let Some(author_id) = filter.author_id {
        qb.push(sep)
            .push("author_id = ")
            .push_bind(uuid_to_blob(author_id));
        sep = " AND ";
    }
    if let Some(max_depth) = filter.max_depth {
        qb.push(sep).push("depth <= ").push_bind(max_depth);
    }
}

fn push_order_and_window(qb: &mut QueryBuilder<'_, Sqlite>, page: &CommentPage) {
    let dir = match page.order_dir {
        OrderDir::Asc => "ASC",
        OrderDir::Desc => "DESC",
    };
    match page.order_by {
        CommentOrderBy::CreatedAt => {
            qb.push(format!(" ORDER BY created_at {dir}, id {dir}"));
        }
        CommentOrderBy::Depth => {
            qb.push(format!(" ORDER BY depth {dir}, created_at {dir}, id {dir}"));
        }
    }
    qb.push(" LIMIT ").push_bind(page.limit as i64);
    qb.push(" OFFSET ").push_bind(page.offset as i64);
}

#[async_trait]
impl CommentRepository for SqliteCommentRepository {
    async fn create(&self, comment: &Comment) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO comments (id, post_id, parent_id, content, author_id, depth, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(comment.id))
        .bind(uuid_to_blob(comment.post_id))
        .bind(comment.parent_id.map(uuid_to_blob))
        .bind(&comment.content)
        .bind(uuid_to_blob(comment.author_id))
        .bind(comment.depth)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Comment> {
        let row = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?"
        ))
        .bind(uuid_to_blob(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        match row {
            Some(row) => comment_from_row(&row),
            None => Err(StoreError::NotFound),
        }
    }

    async fn list(&self, filter: &CommentFilter, page: &CommentPage) -> StoreResult<Vec<Comment>> {
        let mut qb =
            QueryBuilder::new(format!("SELECT {COMMENT_COLUMNS} FROM comments"));
        push_filter(&mut qb, filter);
        push_order_and_window(&mut qb, page);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        rows.iter().map(comment_from_row).collect()
    }

    async fn count(&self, filter: &CommentFilter) -> StoreResult<usize> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) AS n FROM comments");
        push_filter(&mut qb, filter);

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        let n: i64 = row.try_get("n").map_err(StoreError::backend)?;
        Ok(n as usize)
    }

    async fn update(&self, comment: &Comment) -> StoreResult<()> {
        let result = sqlx::query("UPDATE comments SET content = ?, updated_at = ? WHERE id = ?")
            .bind(&comment.content)
            .bind(comment.updated_at)
            .bind(uuid_to_blob(comment.id))
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
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
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM comments WHERE id = ?) AS present")
            .bind(uuid_to_blob(id))
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        row.try_get("present").map_err(StoreError::backend)
    }

    async fn get_by_post_id(&self, post_id: Uuid) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = ? \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(uuid_to_blob(post_id))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.iter().map(comment_from_row).collect()
    }

    async fn get_children(&self, parent_id: Uuid) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE parent_id = ? \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(uuid_to_blob(parent_id))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.iter().map(comment_from_row).collect()
    }

    async fn get_max_depth_for_post(&self, post_id: Uuid) -> StoreResult<i32> {
        let row = sqlx::query("SELECT COALESCE(MAX(depth), 0) AS max_depth FROM comments WHERE post_id = ?")
            .bind(uuid_to_blob(post_id))
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        row.try_get("max_depth").map_err(StoreError::backend)
    }

    async fn delete_by_post_id(&self, post_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM comments WHERE post_id = ?")
            .bind(uuid_to_blob(post_id))
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        log::debug!(
            "deleted {} comments for post {post_id}",
            result.rows_affected()
        );
        Ok(())
    }

    async fn count_by_post_id(&self, post_id: Uuid) -> StoreResult<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM comments WHERE post_id = ?")
            .bind(uuid_to_blob(post_id))
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        let n: i64 = row.try_get("n").map_err(StoreError::backend)?;
        Ok(n as usize)
    }
}
