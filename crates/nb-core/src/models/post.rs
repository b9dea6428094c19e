use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Title ceiling, counted in Unicode scalar values after trimming.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Post body ceiling, counted in Unicode scalar values after trimming.
pub const MAX_POST_CONTENT_LENGTH: usize = 50_000;

/// A published post. Identity is immutable; content belongs to its author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    /// When false, every comment mutation against this post is rejected.
    pub comments_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a post. Validated by [`PostInput::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostInput {
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub comments_enabled: bool,
}

/// Partial update; only supplied fields are validated and applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostUpdateInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub comments_enabled: Option<bool>,
}

/// Conjunctive filter for post listings.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub author_id: Option<Uuid>,
    pub comments_enabled: Option<bool>,
}

fn validate_text(field: &'static str, value: &str, max: usize) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(field, format!("{field} cannot be empty")));
    }
    if trimmed.chars().count() > max {
        return Err(AppError::validation(
            field,
            format!("{field} cannot exceed {max} characters"),
        ));
    }
    Ok(())
}

impl PostInput {
    pub fn validate(&self) -> Result<()> {
        validate_text("title", &self.title, MAX_TITLE_LENGTH)?;
        validate_text("content", &self.content, MAX_POST_CONTENT_LENGTH)?;
        if self.author_id.is_nil() {
            return Err(AppError::validation("author_id", "author_id is required"));
        }
        Ok(())
    }
}

impl PostUpdateInput {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_text("title", title, MAX_TITLE_LENGTH)?;
        }
        if let Some(content) = &self.content {
            validate_text("content", content, MAX_POST_CONTENT_LENGTH)?;
        }
        Ok(())
    }
}

impl Post {
    /// Builds a new post from validated input: trims string fields and stamps
    /// both timestamps with the same instant.
    pub fn new(input: PostInput) -> Self {
        let now = Utc::now();
        Post {
            id: Uuid::now_v7(),
            title: input.title.trim().to_string(),
            content: input.content.trim().to_string(),
            author_id: input.author_id,
            comments_enabled: input.comments_enabled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a validated partial update and restamps `updated_at`.
    /// `created_at` is never touched.
    pub fn apply(&mut self, input: PostUpdateInput) {
        if let Some(title) = input.title {
            self.title = title.trim().to_string();
        }
        if let Some(content) = input.content {
            self.content = content.trim().to_string();
        }
        if let Some(enabled) = input.comments_enabled {
            self.comments_enabled = enabled;
        }
        self.updated_at = Utc::now();
    }

    pub fn can_add_comments(&self) -> bool {
        self.comments_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: &str, content: &str) -> PostInput {
        PostInput {
            title: title.to_string(),
            content: content.to_string(),
            author_id: Uuid::now_v7(),
            comments_enabled: true,
        }
    }

    #[test]
    fn title_boundary_is_200_characters() {
        assert!(input(&"a".repeat(200), "body").validate().is_ok());
        let err = input(&"a".repeat(201), "body").validate().unwrap_err();
        assert_eq!(err.details().get("field").unwrap(), "title");
    }

    #[test]
    fn content_boundary_is_50_000_characters() {
        assert!(input("t", &"b".repeat(50_000)).validate().is_ok());
        assert!(input("t", &"b".repeat(50_001)).validate().is_err());
    }

    #[test]
    fn whitespace_only_fields_are_rejected() {
        assert!(input("   ", "body").validate().is_err());
        assert!(input("title", " \n\t ").validate().is_err());
    }

    #[test]
    fn nil_author_is_rejected() {
        let mut bad = input("t", "b");
        bad.author_id = Uuid::nil();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn new_trims_and_stamps_matching_timestamps() {
        let post = Post::new(input("  padded title  ", "  padded body  "));
        assert_eq!(post.title, "padded title");
        assert_eq!(post.content, "padded body");
        assert_eq!(post.created_at, post.updated_at);
    }

    #[test]
    fn apply_touches_only_supplied_fields() {
        let mut post = Post::new(input("before", "body"));
        let created = post.created_at;

        post.apply(PostUpdateInput {
            title: Some("after".to_string()),
            ..Default::default()
        });

        assert_eq!(post.title, "after");
        assert_eq!(post.content, "body");
        assert_eq!(post.created_at, created);
        assert!(post.updated_at >= created);
    }

    #[test]
    fn update_validates_only_supplied_fields() {
        let update = PostUpdateInput {
            title: None,
            content: Some("ok".to_string()),
            comments_enabled: Some(false),
        };
        assert!(update.validate().is_ok());

        let update = PostUpdateInput {
            title: Some("".to_string()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }
}
