use anyhow::anyhow;
use async_trait::async_trait;
use nb_core::error::{StoreError, StoreResult};
use nb_core::models::{Comment, CommentFilter};
use nb_core::traits::{CommentOrderBy, CommentPage, CommentRepository, OrderDir};
use uuid::Uuid;

use crate::{window, Table};

/// In-memory comment repository over a shared comment table.
pub struct MemoryCommentRepository {
    comments: Table<Comment>,
}

impl MemoryCommentRepository {
    pub fn new(comments: Table<Comment>) -> Self {
        MemoryCommentRepository { comments }
    }
}

fn matches(comment: &Comment, filter: &CommentFilter) -> bool {
    if let Some(post_id) = filter.post_id {
        if comment.post_id != post_id {
            return false;
        }
    }
    if let Some(parent) = &filter.parent_id {
        match parent {
            // root comments only
            None => {
                if comment.parent_id.is_some() {
                    return false;
                }
            }
            Some(parent_id) => {
                if comment.parent_id != Some(*parent_id) {
                    return false;
                }
            }
        }
    }
    if let Some(author_id) = filter.author_id {
        if comment.author_id != author_id {
            return false;
        }
    }
    if let Some(max_depth) = filter.max_depth {
        if comment.depth > max_depth {
            return false;
        }
    }
    true
}

fn sort_comments(comments: &mut [Comment], order_by: CommentOrderBy, order_dir: OrderDir) {
    comments.sort_by(|a, b| {
        let ord = match order_by {
            CommentOrderBy::CreatedAt => a.created_at.cmp(&b.created_at),
            CommentOrderBy::Depth => a
                .depth
                .cmp(&b.depth)
                .then_with(|| a.created_at.cmp(&b.created_at)),
        };
        let ord = ord.then_with(|| a.id.cmp(&b.id));
        match order_dir {
            OrderDir::Asc => ord,
            OrderDir::Desc => ord.reverse(),
        }
    });
}

/// The `children` collection is transient; the table stores bare rows.
fn bare_row(comment: &Comment) -> Comment {
    let mut row = comment.clone();
    row.children = Vec::new();
    row
}

#[async_trait]
impl CommentRepository for MemoryCommentRepository {
    async fn create(&self, comment: &Comment) -> StoreResult<()> {
        let mut comments = self.comments.write().await;
        if comments.contains_key(&comment.id) {
            return Err(StoreError::backend(anyhow!(
                "comment {} already exists",
                comment.id
            )));
        }
        comments.insert(comment.id, bare_row(comment));
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Comment> {
        let comments = self.comments.read().await;
        comments.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list(&self, filter: &CommentFilter, page: &CommentPage) -> StoreResult<Vec<Comment>> {
        let comments = self.comments.read().await;
        let mut selected: Vec<Comment> = comments
            .values()
            .filter(|comment| matches(comment, filter))
            .cloned()
            .collect();
        drop(comments);

        sort_comments(&mut selected, page.order_by, page.order_dir);
        Ok(window(selected, page.offset, page.limit))
    }

    async fn count(&self, filter: &CommentFilter) -> StoreResult<usize> {
        let comments = self.comments.read().await;
        Ok(comments
            .values()
            .filter(|comment| matches(comment, filter))
            .count())
    }

    async fn update(&self, comment: &Comment) -> StoreResult<()> {
        let mut comments = self.comments.write().await;
        match comments.get_mut(&comment.id) {
            Some(stored) => {
                *stored = bare_row(comment);
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut comments = self.comments.write().await;
        match comments.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn exists(&self, id: Uuid) -> StoreResult<bool> {
        let comments = self.comments.read().await;
        Ok(comments.contains_key(&id))
    }

    async fn get_by_post_id(&self, post_id: Uuid) -> StoreResult<Vec<Comment>> {
        let comments = self.comments.read().await;
        let mut selected: Vec<Comment> = comments
            .values()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect();
        drop(comments);

        sort_comments(&mut selected, CommentOrderBy::CreatedAt, OrderDir::Asc);
        Ok(selected)
    }

    async fn get_children(&self, parent_id: Uuid) -> StoreResult<Vec<Comment>> {
        let comments = self.comments.read().await;
        let mut selected: Vec<Comment> = comments
            .values()
            .filter(|comment| comment.parent_id == Some(parent_id))
            .cloned()
            .collect();
        drop(comments);

        sort_comments(&mut selected, CommentOrderBy::CreatedAt, OrderDir::Asc);
        Ok(selected)
    }

    async fn get_max_depth_for_post(&self, post_id: Uuid) -> StoreResult<i32> {
        let comments = self.comments.read().await;
        Ok(comments
            .values()
            .filter(|comment| comment.post_id == post_id)
            .map(|comment| comment.depth)
            .max()
            .unwrap_or(0))
    }

    async fn delete_by_post_id(&self, post_id: Uuid) -> StoreResult<()> {
        let mut comments = self.comments.write().await;
        comments.retain(|_, comment| comment.post_id != post_id);
        Ok(())
    }

    async fn count_by_post_id(&self, post_id: Uuid) -> StoreResult<usize> {
        let comments = self.comments.read().await;
        Ok(comments
            .values()
            .filter(|comment| comment.post_id == post_id)
            .count())
    }
}
