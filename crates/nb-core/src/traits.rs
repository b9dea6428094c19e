//! # Core Traits (Ports)
//!
//! Any storage plugin must implement these traits to be used by the service
//! layer. Implementations must be safe under concurrent calls from many
//! requests and must never return partial rows: a lookup either yields the
//! whole entity or [`StoreError::NotFound`].

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Result, StoreResult};
use crate::models::{Comment, CommentFilter, Post, PostFilter};

/// Sort direction for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDir {
    #[default]
    Asc,
    Desc,
}

/// Sort keys accepted by post listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostOrderBy {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
}

/// Sort keys accepted by comment listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentOrderBy {
    #[default]
    CreatedAt,
    Depth,
}

/// Window and ordering for a post list query.
#[derive(Debug, Clone, Copy)]
pub struct PostPage {
    pub offset: usize,
    pub limit: usize,
    pub order_by: PostOrderBy,
    pub order_dir: OrderDir,
}

/// Window and ordering for a comment list query.
#[derive(Debug, Clone, Copy)]
pub struct CommentPage {
    pub offset: usize,
    pub limit: usize,
    pub order_by: CommentOrderBy,
    pub order_dir: OrderDir,
}

/// Data persistence contract for posts.
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &Post) -> StoreResult<()>;
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Post>;
    async fn list(&self, filter: &PostFilter, page: &PostPage) -> StoreResult<Vec<Post>>;
    async fn count(&self, filter: &PostFilter) -> StoreResult<usize>;
    async fn update(&self, post: &Post) -> StoreResult<()>;
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
    async fn exists(&self, id: Uuid) -> StoreResult<bool>;

    /// Posts joined with how many comments each carries.
    async fn list_with_comment_counts(
        &self,
        filter: &PostFilter,
        page: &PostPage,
    ) -> StoreResult<Vec<(Post, i64)>>;
}

/// Data persistence contract for comments.
///
/// Beyond plain CRUD the contract exposes hierarchy-specific queries so the
/// SQL backend can lean on indexes and recursive queries while the in-memory
/// backend walks its maps.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, comment: &Comment) -> StoreResult<()>;
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Comment>;
    async fn list(&self, filter: &CommentFilter, page: &CommentPage) -> StoreResult<Vec<Comment>>;
    async fn count(&self, filter: &CommentFilter) -> StoreResult<usize>;

    /// Persists a content change; structural fields never change after create.
    async fn update(&self, comment: &Comment) -> StoreResult<()>;

    /// Removes a single node. Cascading over descendants is composed by the
    /// service layer.
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
    async fn exists(&self, id: Uuid) -> StoreResult<bool>;

    /// Every comment of a post, created-at ascending; feed for tree assembly.
    async fn get_by_post_id(&self, post_id: Uuid) -> StoreResult<Vec<Comment>>;

    /// Direct children of a parent, created-at ascending.
    async fn get_children(&self, parent_id: Uuid) -> StoreResult<Vec<Comment>>;

    /// Deepest nesting level present under a post; 0 when uncommented.
    async fn get_max_depth_for_post(&self, post_id: Uuid) -> StoreResult<i32>;

    /// Bulk removal of a post's comments (post-deletion cascade).
    async fn delete_by_post_id(&self, post_id: Uuid) -> StoreResult<()>;

    async fn count_by_post_id(&self, post_id: Uuid) -> StoreResult<usize>;
}

/// The repository bundle handed to the service layer. Which backend sits
/// behind the trait objects is a construction-time configuration choice.
#[derive(Clone)]
pub struct Repositories {
    pub post: Arc<dyn PostRepository>,
    pub comment: Arc<dyn CommentRepository>,
}

/// Fire-and-forget notification capability consumed by the comment service.
/// Errors are logged by the caller and never fail the parent mutation.
#[async_trait]
pub trait CommentNotifier: Send + Sync {
    async fn notify_created(&self, comment: &Comment) -> Result<()>;
    async fn notify_updated(&self, comment: &Comment) -> Result<()>;
    async fn notify_deleted(&self, post_id: Uuid, comment_id: Uuid) -> Result<()>;
}
