use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Comment content ceiling, counted in Unicode scalar values after trimming.
pub const MAX_COMMENT_LENGTH: usize = 2000;

/// A single comment in a post's hierarchy.
///
/// Comments form a forest per post: roots carry `parent_id = None` and
/// `depth = 0`, replies carry the parent's id and `depth = parent.depth + 1`.
/// `children` is transient: persistence stores only the parent back-edge,
/// and the collection is populated by [`build_comments_tree`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub author_id: Uuid,
    /// Distance from the root of this comment's thread; roots are 0.
    pub depth: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Comment>,
}

/// Input for creating a comment. `parent_id` is `None` for root comments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentInput {
    pub post_id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub author_id: Uuid,
}

/// Partial update; only the content can change after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentUpdateInput {
    pub content: Option<String>,
}

/// Conjunctive filter for comment listings.
///
/// `parent_id` is tri-state: `None` puts no constraint on the hierarchy,
/// `Some(None)` selects root comments only, `Some(Some(id))` selects the
/// direct children of `id`.
#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    pub post_id: Option<Uuid>,
    pub parent_id: Option<Option<Uuid>>,
    pub author_id: Option<Uuid>,
    pub max_depth: Option<i32>,
}

impl CommentInput {
    pub fn validate(&self) -> Result<()> {
        let trimmed = self.content.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("content", "content cannot be empty"));
        }
        if trimmed.chars().count() > MAX_COMMENT_LENGTH {
            return Err(AppError::validation(
                "content",
                format!("content cannot exceed {MAX_COMMENT_LENGTH} characters"),
            ));
        }
        if self.post_id.is_nil() {
            return Err(AppError::validation("post_id", "post_id is required"));
        }
        if self.author_id.is_nil() {
            return Err(AppError::validation("author_id", "author_id is required"));
        }
        Ok(())
    }
}

impl CommentUpdateInput {
    pub fn validate(&self) -> Result<()> {
        if let Some(content) = &self.content {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Err(AppError::validation("content", "content cannot be empty"));
            }
            if trimmed.chars().count() > MAX_COMMENT_LENGTH {
                return Err(AppError::validation(
                    "content",
                    format!("content cannot exceed {MAX_COMMENT_LENGTH} characters"),
                ));
            }
        }
        Ok(())
    }
}

impl Comment {
    /// Builds a new comment from validated input. The depth is computed by
    /// the caller (0 for roots, parent depth + 1 for replies) because only
    /// the service layer can see the parent row.
    pub fn new(input: CommentInput, depth: i32) -> Self {
        let now = Utc::now();
        Comment {
            id: Uuid::now_v7(),
            post_id: input.post_id,
            parent_id: input.parent_id,
            content: input.content.trim().to_string(),
            author_id: input.author_id,
            depth,
            created_at: now,
            updated_at: now,
            children: Vec::new(),
        }
    }

    /// Applies a validated partial update and restamps `updated_at`.
    pub fn apply(&mut self, input: CommentUpdateInput) {
        if let Some(content) = input.content {
            self.content = content.trim().to_string();
        }
        self.updated_at = Utc::now();
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Whether replies to this comment are allowed. Always true today;
    /// the seam exists so thread archival can hook in without touching
    /// the service layer.
    pub fn can_be_replied_to(&self) -> bool {
        true
    }
}

/// Lifecycle verb attached to every subscription payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommentAction {
    Created,
    Updated,
    Deleted,
}

impl std::fmt::Display for CommentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommentAction::Created => "CREATED",
            CommentAction::Updated => "UPDATED",
            CommentAction::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

/// Event pushed to subscribers of a post's comment stream.
///
/// `comment` carries the full snapshot for `Created`/`Updated` and is `None`
/// for `Deleted`, where `comment_id` is all the receiver gets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentEvent {
    pub post_id: Uuid,
    pub comment_id: Uuid,
    pub comment: Option<Comment>,
    pub action: CommentAction,
}

impl CommentEvent {
    pub fn created(comment: Comment) -> Self {
        CommentEvent {
            post_id: comment.post_id,
            comment_id: comment.id,
            comment: Some(comment),
            action: CommentAction::Created,
        }
    }

    pub fn updated(comment: Comment) -> Self {
        CommentEvent {
            post_id: comment.post_id,
            comment_id: comment.id,
            comment: Some(comment),
            action: CommentAction::Updated,
        }
    }

    pub fn deleted(post_id: Uuid, comment_id: Uuid) -> Self {
        CommentEvent {
            post_id,
            comment_id,
            comment: None,
            action: CommentAction::Deleted,
        }
    }
}

/// Organises a flat list of one post's comments into a forest.
///
/// Roots keep their input order, as does each parent's `children` list, so
/// feeding rows sorted by `created_at` ascending yields chronologically
/// ordered threads. Nodes whose parent is absent from the input are dropped:
/// they were filtered out or deleted between fetch and assembly. O(n).
pub fn build_comments_tree(comments: Vec<Comment>) -> Vec<Comment> {
    if comments.is_empty() {
        return Vec::new();
    }

    let ids: HashSet<Uuid> = comments.iter().map(|c| c.id).collect();

    let mut roots: Vec<Comment> = Vec::new();
    let mut buckets: HashMap<Uuid, Vec<Comment>> = HashMap::new();
    for mut comment in comments {
        comment.children.clear();
        match comment.parent_id {
            None => roots.push(comment),
            Some(parent_id) if ids.contains(&parent_id) => {
                buckets.entry(parent_id).or_default().push(comment);
            }
            Some(_) => {}
        }
    }

    fn attach(node: &mut Comment, buckets: &mut HashMap<Uuid, Vec<Comment>>) {
        if let Some(mut children) = buckets.remove(&node.id) {
            for child in &mut children {
                attach(child, buckets);
            }
            node.children = children;
        }
    }

    for root in &mut roots {
        attach(root, &mut buckets);
    }

    roots
}

/// Lazy depth-first preorder walk over an assembled forest.
///
/// Every parent is yielded before any of its children, so rendering the
/// sequence with `depth`-based indentation reproduces the thread layout.
pub fn flatten_comments_tree(tree: &[Comment]) -> CommentTreeIter<'_> {
    CommentTreeIter {
        stack: tree.iter().rev().collect(),
    }
}

pub struct CommentTreeIter<'a> {
    stack: Vec<&'a Comment>,
}

impl<'a> Iterator for CommentTreeIter<'a> {
    type Item = &'a Comment;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}
