//! # Domain Models
//!
//! The core entities of NestBoard: posts, their hierarchical comments, and
//! the pagination/event types shared by every storage backend.
//! We use UUID v7 for time-ordered, globally unique identification.

mod comment;
mod pagination;
mod post;

pub use comment::{
    build_comments_tree, flatten_comments_tree, Comment, CommentAction, CommentEvent,
    CommentFilter, CommentInput, CommentTreeIter, CommentUpdateInput, MAX_COMMENT_LENGTH,
};
pub use pagination::{Connection, Edge, PageInfo, PaginationInput};
pub use post::{
    Post, PostFilter, PostInput, PostUpdateInput, MAX_POST_CONTENT_LENGTH, MAX_TITLE_LENGTH,
};

/// Connection of posts, ordered newest-first by default.
pub type PostConnection = Connection<Post>;

/// Connection of comments, ordered oldest-first by default.
pub type CommentConnection = Connection<Comment>;
