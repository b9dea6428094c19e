use std::collections::BTreeMap;
use std::sync::Arc;

use nb_core::config::CoreConfig;
use nb_core::error::{AppError, Result};
use nb_core::models::{
    build_comments_tree, Comment, CommentConnection, CommentFilter, CommentInput,
    CommentUpdateInput, PaginationInput,
};
use nb_core::traits::{
    CommentNotifier, CommentOrderBy, CommentPage, CommentRepository, OrderDir, PostRepository,
    Repositories,
};
use uuid::Uuid;

use crate::map_store_err;
use crate::pagination::{build_connection, requested_limit, validate_pagination};

/// Comment CRUD with depth derivation, parent/post coherence checks, tree
/// retrieval, and event emission toward the subscription service.
pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    posts: Arc<dyn PostRepository>,
    notifier: Option<Arc<dyn CommentNotifier>>,
    config: CoreConfig,
}

impl CommentService {
    pub fn new(
        repos: &Repositories,
        config: CoreConfig,
        notifier: Option<Arc<dyn CommentNotifier>>,
    ) -> Self {
        CommentService {
            comments: repos.comment.clone(),
            posts: repos.post.clone(),
            notifier,
            config,
        }
    }

    /// Creates a comment after establishing that the post exists and accepts
    /// comments, and - for replies - that the parent is coherent and the
    /// nesting ceiling holds.
    pub async fn create_comment(&self, input: CommentInput) -> Result<Comment> {
        input.validate()?;

        let post = self
            .posts
            .get_by_id(input.post_id)
            .await
            .map_err(|err| map_store_err(err, "post", input.post_id, "get post"))?;

        if !post.can_add_comments() {
            log::warn!(
                "rejected comment on post {} by {}: comments disabled",
                input.post_id,
                input.author_id
            );
            return Err(AppError::CommentsDisabled { post_id: post.id });
        }

        let depth = match input.parent_id {
            None => 0,
            Some(parent_id) => {
                let parent = self
                    .comments
                    .get_by_id(parent_id)
                    .await
                    .map_err(|err| map_store_err(err, "parent comment", parent_id, "get parent"))?;

                if parent.post_id != input.post_id {
                    log::warn!(
                        "rejected comment: parent {parent_id} belongs to post {} not {}",
                        parent.post_id,
                        input.post_id
                    );
                    return Err(AppError::InvalidParent {
                        parent_id,
                        expected_post: input.post_id,
                        actual_post: parent.post_id,
                    });
                }

                let depth = parent.depth + 1;
                if depth > self.config.max_comment_depth {
                    return Err(AppError::validation(
                        "depth",
                        format!(
                            "comment depth cannot exceed {}",
                            self.config.max_comment_depth
                        ),
                    ));
                }
                depth
            }
        };

        let comment = Comment::new(input, depth);
        self.comments
            .create(&comment)
            .await
            .map_err(|err| map_store_err(err, "comment", comment.id, "create comment"))?;

        log::info!(
            "comment created: id={} post={} depth={}",
            comment.id,
            comment.post_id,
            comment.depth
        );

        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.notify_created(&comment).await {
                log::warn!("comment-created notification failed for {}: {err}", comment.id);
            }
        }

        Ok(comment)
    }

    pub async fn get_comment(&self, id: Uuid) -> Result<Comment> {
        if id.is_nil() {
            return Err(AppError::validation("id", "comment ID is required"));
        }
        self.comments
            .get_by_id(id)
            .await
            .map_err(|err| map_store_err(err, "comment", id, "get comment"))
    }

    /// Pages comments oldest-first under the same Relay rules as the post
    /// listing; the default window is the configured comment page size.
    pub async fn list_comments(
        &self,
        filter: CommentFilter,
        pagination: PaginationInput,
    ) -> Result<CommentConnection> {
        validate_pagination(&pagination, self.config.max_page_size)?;

        let page = CommentPage {
            offset: 0,
            limit: requested_limit(&pagination, self.config.default_comment_page_size),
            order_by: CommentOrderBy::CreatedAt,
            order_dir: OrderDir::Asc,
        };

        let comments = self
            .comments
            .list(&filter, &page)
            .await
            .map_err(|err| map_store_err(err, "comment", Uuid::nil(), "list comments"))?;
        let total = self
            .comments
            .count(&filter)
            .await
            .map_err(|err| map_store_err(err, "comment", Uuid::nil(), "count comments"))?;

        Ok(build_connection(
            comments,
            &pagination,
            total,
            |comment: &Comment| (comment.created_at, comment.id),
        ))
    }

    /// The full comment forest of a post, assembled from one bulk fetch.
    pub async fn get_comments_tree(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        if post_id.is_nil() {
            return Err(AppError::validation("post_id", "post ID is required"));
        }

        let exists = self
            .posts
            .exists(post_id)
            .await
            .map_err(|err| map_store_err(err, "post", post_id, "check post existence"))?;
        if !exists {
            return Err(AppError::not_found("post", post_id));
        }

        let comments = self
            .comments
            .get_by_post_id(post_id)
            .await
            .map_err(|err| map_store_err(err, "comment", post_id, "get post comments"))?;

        let total = comments.len();
        let tree = build_comments_tree(comments);
        log::debug!(
            "comments tree built: post={post_id} comments={total} roots={}",
            tree.len()
        );
        Ok(tree)
    }

    pub async fn update_comment(
        &self,
        id: Uuid,
        input: CommentUpdateInput,
        author_id: Uuid,
    ) -> Result<Comment> {
        input.validate()?;
        if id.is_nil() {
            return Err(AppError::validation("id", "comment ID is required"));
        }
        if author_id.is_nil() {
            return Err(AppError::validation("author_id", "author ID is required"));
        }

        let mut comment = self.get_comment(id).await?;
        if comment.author_id != author_id {
            log::warn!(
                "rejected comment update: id={id} owner={} requester={author_id}",
                comment.author_id
            );
            return Err(AppError::forbidden("update comment"));
        }

        comment.apply(input);
        self.comments
            .update(&comment)
            .await
            .map_err(|err| map_store_err(err, "comment", id, "update comment"))?;

        log::info!("comment updated: id={id} author={author_id}");

        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.notify_updated(&comment).await {
                log::warn!("comment-updated notification failed for {id}: {err}");
            }
        }

        Ok(comment)
    }

    /// Deletes a comment and its transitive descendants.
    ///
    /// The cascade is explicit: descendants are discovered through
    /// `get_children` and removed deepest-first, so both backends observe
    /// the same single-node deletes. A descendant already swept by a storage
    /// cascade is not an error.
    pub async fn delete_comment(&self, id: Uuid, author_id: Uuid) -> Result<()> {
        if id.is_nil() {
            return Err(AppError::validation("id", "comment ID is required"));
        }
        if author_id.is_nil() {
            return Err(AppError::validation("author_id", "author ID is required"));
        }

        let comment = self.get_comment(id).await?;
        if comment.author_id != author_id {
            log::warn!(
                "rejected comment delete: id={id} owner={} requester={author_id}",
                comment.author_id
            );
            return Err(AppError::forbidden("delete comment"));
        }

        // discover the subtree; every node appears before its descendants
        let mut descendants = Vec::new();
        let mut frontier = vec![id];
        while let Some(current) = frontier.pop() {
            let children = self
                .comments
                .get_children(current)
                .await
                .map_err(|err| map_store_err(err, "comment", current, "get child comments"))?;
            for child in children {
                frontier.push(child.id);
                descendants.push(child.id);
            }
        }

        for child_id in descendants.iter().rev() {
            match self.comments.delete(*child_id).await {
                Ok(()) => {}
                // already gone: racing delete or a storage-level cascade
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    return Err(map_store_err(err, "comment", *child_id, "delete child comment"))
                }
            }
        }

        self.comments
            .delete(id)
            .await
            .map_err(|err| map_store_err(err, "comment", id, "delete comment"))?;

        log::info!(
            "comment deleted: id={id} post={} author={author_id} removed={}",
            comment.post_id,
            descendants.len() + 1
        );

        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.notify_deleted(comment.post_id, id).await {
                log::warn!("comment-deleted notification failed for {id}: {err}");
            }
        }

        Ok(())
    }

    /// A single comment with its subtree attached, cut from the post-wide
    /// assembled forest. Falls back to the bare comment if the row vanished
    /// from the bulk fetch in the meantime.
    pub async fn get_comment_with_children(&self, id: Uuid) -> Result<Comment> {
        let comment = self.get_comment(id).await?;

        let all = self
            .comments
            .get_by_post_id(comment.post_id)
            .await
            .map_err(|err| map_store_err(err, "comment", comment.post_id, "get post comments"))?;

        let tree = build_comments_tree(all);
        Ok(find_in_tree(&tree, id).cloned().unwrap_or(comment))
    }

    /// How many comments sit at each depth level of a post.
    pub async fn comment_depth_statistics(&self, post_id: Uuid) -> Result<BTreeMap<i32, usize>> {
        let comments = self
            .comments
            .get_by_post_id(post_id)
            .await
            .map_err(|err| map_store_err(err, "comment", post_id, "get post comments"))?;

        let mut statistics = BTreeMap::new();
        for comment in &comments {
            *statistics.entry(comment.depth).or_insert(0) += 1;
        }
        Ok(statistics)
    }
}

fn find_in_tree(tree: &[Comment], id: Uuid) -> Option<&Comment> {
    for comment in tree {
        if comment.id == id {
            return Some(comment);
        }
        if let Some(found) = find_in_tree(&comment.children, id) {
            return Some(found);
        }
    }
    None
}
