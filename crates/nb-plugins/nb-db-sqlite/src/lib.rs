//! # nb-db-sqlite
//!
//! SQLite implementation of the repository contract, mapping between the
//! relational model and the nb-core domain models. Every statement is
//! parameterised; deletes cascade through foreign keys so descendants can
//! never outlive their post or parent.

mod comment;
mod post;

use std::str::FromStr;
use std::sync::Arc;

use nb_core::error::{StoreError, StoreResult};
use nb_core::traits::Repositories;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

pub use comment::SqliteCommentRepository;
pub use post::SqlitePostRepository;

/// UUIDs are stored as 16-byte blobs.
pub(crate) fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

pub(crate) fn blob_to_uuid(blob: &[u8]) -> StoreResult<Uuid> {
    Uuid::from_slice(blob)
        .map_err(|_| StoreError::backend(anyhow::anyhow!("stored id is not a 16-byte uuid")))
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id               BLOB PRIMARY KEY,
    title            TEXT NOT NULL,
    content          TEXT NOT NULL,
    author_id        BLOB NOT NULL,
    comments_enabled INTEGER NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    id         BLOB PRIMARY KEY,
    post_id    BLOB NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    parent_id  BLOB REFERENCES comments(id) ON DELETE CASCADE,
    content    TEXT NOT NULL,
    author_id  BLOB NOT NULL,
    depth      INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments(post_id);
CREATE INDEX IF NOT EXISTS idx_comments_parent_id ON comments(parent_id);
CREATE INDEX IF NOT EXISTS idx_comments_post_created ON comments(post_id, created_at);
CREATE INDEX IF NOT EXISTS idx_posts_author_id ON posts(author_id);
"#;

/// Opens (creating if missing) the database at `url` and bootstraps the
/// schema. Foreign-key enforcement is switched on per connection; without it
/// SQLite silently ignores the cascade clauses.
pub async fn connect(url: &str) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(StoreError::backend)?
        .create_if_missing(true)
        .foreign_keys(true);

    let mut pool_options = SqlitePoolOptions::new();
    if url.contains(":memory:") {
        // an in-memory database is private to its connection; the pool must
        // hold exactly one and never retire it, or the data vanishes
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(StoreError::backend)?;

    sqlx::raw_sql(SCHEMA)
        .execute(&pool)
        .await
        .map_err(StoreError::backend)?;

    log::debug!("sqlite schema ready at {url}");
    Ok(pool)
}

/// Builds a repository bundle over a single shared pool.
pub async fn sqlite_repositories(url: &str) -> StoreResult<Repositories> {
    let pool = connect(url).await?;
    Ok(Repositories {
        post: Arc::new(SqlitePostRepository::new(pool.clone())),
        comment: Arc::new(SqliteCommentRepository::new(pool)),
    })
}
