use std::sync::Arc;

use nb_core::config::CoreConfig;
use nb_core::error::{AppError, Result};
use nb_core::models::{
    PaginationInput, Post, PostConnection, PostFilter, PostInput, PostUpdateInput,
};
use nb_core::traits::{
    CommentRepository, OrderDir, PostOrderBy, PostPage, PostRepository, Repositories,
};
use uuid::Uuid;

use crate::map_store_err;
use crate::pagination::{build_connection, requested_limit, validate_pagination};

/// Post CRUD with author-ownership checks and comment-cascade orchestration.
pub struct PostService {
    posts: Arc<dyn PostRepository>,
    comments: Arc<dyn CommentRepository>,
    config: CoreConfig,
}

impl PostService {
    pub fn new(repos: &Repositories, config: CoreConfig) -> Self {
        PostService {
            posts: repos.post.clone(),
            comments: repos.comment.clone(),
            config,
        }
    }

    pub async fn create_post(&self, input: PostInput) -> Result<Post> {
        input.validate()?;

        let post = Post::new(input);
        self.posts
            .create(&post)
            .await
            .map_err(|err| map_store_err(err, "post", post.id, "create post"))?;

        log::info!(
            "post created: id={} author={} title={:?}",
            post.id,
            post.author_id,
            post.title
        );
        Ok(post)
    }

    pub async fn get_post(&self, id: Uuid) -> Result<Post> {
        if id.is_nil() {
            return Err(AppError::validation("id", "post ID is required"));
        }
        self.posts
            .get_by_id(id)
            .await
            .map_err(|err| map_store_err(err, "post", id, "get post"))
    }

    /// Pages posts newest-first. The window size is `first`/`last` when
    /// supplied (within the configured ceiling), the default otherwise.
    pub async fn list_posts(
        &self,
        filter: PostFilter,
        pagination: PaginationInput,
    ) -> Result<PostConnection> {
        validate_pagination(&pagination, self.config.max_page_size)?;

        let page = PostPage {
            offset: 0,
            limit: requested_limit(&pagination, self.config.default_post_page_size),
            order_by: PostOrderBy::CreatedAt,
            order_dir: OrderDir::Desc,
        };

        let posts = self
            .posts
            .list(&filter, &page)
            .await
            .map_err(|err| map_store_err(err, "post", Uuid::nil(), "list posts"))?;
        let total = self
            .posts
            .count(&filter)
            .await
            .map_err(|err| map_store_err(err, "post", Uuid::nil(), "count posts"))?;

        let connection = build_connection(posts, &pagination, total, |post: &Post| {
            (post.created_at, post.id)
        });

        log::debug!(
            "posts listed: window={} total={} has_next={}",
            connection.len(),
            total,
            connection.page_info.has_next_page
        );
        Ok(connection)
    }

    pub async fn update_post(
        &self,
        id: Uuid,
        input: PostUpdateInput,
        author_id: Uuid,
    ) -> Result<Post> {
        input.validate()?;
        if id.is_nil() {
            return Err(AppError::validation("id", "post ID is required"));
        }
        if author_id.is_nil() {
            return Err(AppError::validation("author_id", "author ID is required"));
        }

        let mut post = self.get_post(id).await?;
        if post.author_id != author_id {
            log::warn!(
                "rejected post update: id={id} owner={} requester={author_id}",
                post.author_id
            );
            return Err(AppError::forbidden("update post"));
        }

        post.apply(input);
        self.posts
            .update(&post)
            .await
            .map_err(|err| map_store_err(err, "post", id, "update post"))?;

        log::info!("post updated: id={id} author={author_id}");
        Ok(post)
    }

    /// Deletes a post and everything under it. The comment sweep runs first;
    /// the repository bundle guarantees the pair is observed atomically
    /// (FK cascade on SQL, lock serialisation in memory).
    pub async fn delete_post(&self, id: Uuid, author_id: Uuid) -> Result<()> {
        if id.is_nil() {
            return Err(AppError::validation("id", "post ID is required"));
        }
        if author_id.is_nil() {
            return Err(AppError::validation("author_id", "author ID is required"));
        }

        let post = self.get_post(id).await?;
        if post.author_id != author_id {
            log::warn!(
                "rejected post delete: id={id} owner={} requester={author_id}",
                post.author_id
            );
            return Err(AppError::forbidden("delete post"));
        }

        // best-effort, for the audit line only
        let comment_count = match self.comments.count_by_post_id(id).await {
            Ok(count) => count,
            Err(err) => {
                log::warn!("could not count comments before deleting post {id}: {err}");
                0
            }
        };

        self.comments
            .delete_by_post_id(id)
            .await
            .map_err(|err| map_store_err(err, "post", id, "delete post comments"))?;

        self.posts
            .delete(id)
            .await
            .map_err(|err| map_store_err(err, "post", id, "delete post"))?;

        log::info!(
            "post deleted: id={id} author={author_id} comments_removed={comment_count}"
        );
        Ok(())
    }

    /// Flips only the comments-enabled flag, with the same ownership rules
    /// as any other update.
    pub async fn toggle_comments(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        enabled: bool,
    ) -> Result<Post> {
        let input = PostUpdateInput {
            comments_enabled: Some(enabled),
            ..Default::default()
        };
        let post = self.update_post(post_id, input, author_id).await?;
        log::info!("post comments toggled: id={post_id} enabled={enabled}");
        Ok(post)
    }

    /// Posts paired with how many comments each carries, same filter and
    /// window rules as [`PostService::list_posts`].
    pub async fn list_posts_with_comment_counts(
        &self,
        filter: PostFilter,
        pagination: PaginationInput,
    ) -> Result<Vec<(Post, i64)>> {
        validate_pagination(&pagination, self.config.max_page_size)?;

        let page = PostPage {
            offset: 0,
            limit: requested_limit(&pagination, self.config.default_post_page_size),
            order_by: PostOrderBy::CreatedAt,
            order_dir: OrderDir::Desc,
        };

        self.posts
            .list_with_comment_counts(&filter, &page)
            .await
            .map_err(|err| map_store_err(err, "post", Uuid::nil(), "list posts with counts"))
    }
}
