//! # nb-db-memory
//!
//! HashMap-backed implementation of the repository contract, used by tests
//! and by deployments that do not need durability. Each collection sits
//! behind one reader-writer lock; values are cloned on write and on read so
//! no caller ever aliases the stored row.

mod comment;
mod post;

use std::collections::HashMap;
use std::sync::Arc;

use nb_core::models::{Comment, Post};
use nb_core::traits::Repositories;
use tokio::sync::RwLock;
use uuid::Uuid;

pub use comment::MemoryCommentRepository;
pub use post::MemoryPostRepository;

/// One locked collection. The post repository and comment repository share
/// the comment table so cross-entity queries stay inside one backend.
pub type Table<T> = Arc<RwLock<HashMap<Uuid, T>>>;

/// Builds a repository bundle over freshly allocated tables.
///
/// The post repository keeps a read handle on the comment table so
/// `list_with_comment_counts` can answer without a second backend.
pub fn memory_repositories() -> Repositories {
    let posts: Table<Post> = Arc::new(RwLock::new(HashMap::new()));
    let comments: Table<Comment> = Arc::new(RwLock::new(HashMap::new()));

    Repositories {
        post: Arc::new(MemoryPostRepository::new(posts, comments.clone())),
        comment: Arc::new(MemoryCommentRepository::new(comments)),
    }
}

/// Applies an offset/limit window in-process.
///
/// An offset past the end and a zero limit both yield an empty page; both
/// are legal queries, not errors.
pub(crate) fn window<T>(mut items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    if offset >= items.len() {
        return Vec::new();
    }
    items.drain(..offset);
    items.truncate(limit);
    items
}
