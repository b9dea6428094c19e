//! # AppError
//!
//! Centralized error handling for the NestBoard ecosystem.
//! Maps domain-specific failures to actionable error types.

use std::collections::BTreeMap;

use thiserror::Error;
use uuid::Uuid;

/// Machine-readable error kind, surfaced alongside the human message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    CommentsDisabled,
    InvalidParent,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::CommentsDisabled => "COMMENTS_DISABLED",
            ErrorKind::InvalidParent => "INVALID_PARENT",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// The primary error type for all nb-core operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// Input fails domain constraints (length limits, zero identifiers,
    /// pagination bounds, malformed cursors).
    #[error("validation failed on '{field}': {message}")]
    Validation { field: String, message: String },

    /// Target entity does not exist.
    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Mutation attempted by someone other than the author.
    #[error("action '{action}' is forbidden")]
    Forbidden { action: String },

    /// Commenting attempted on a post whose author switched comments off.
    #[error("comments are disabled for this post")]
    CommentsDisabled { post_id: Uuid },

    /// Parent comment belongs to a different post than the one targeted.
    #[error("parent comment must belong to the same post")]
    InvalidParent {
        parent_id: Uuid,
        expected_post: Uuid,
        actual_post: Uuid,
    },

    /// Infrastructure failure (storage I/O, notifier invariant violation).
    #[error("internal service error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        AppError::NotFound { entity, id }
    }

    pub fn forbidden(action: impl Into<String>) -> Self {
        AppError::Forbidden {
            action: action.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation { .. } => ErrorKind::Validation,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Forbidden { .. } => ErrorKind::Forbidden,
            AppError::CommentsDisabled { .. } => ErrorKind::CommentsDisabled,
            AppError::InvalidParent { .. } => ErrorKind::InvalidParent,
            AppError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// COMMENTS_DISABLED is a refinement of FORBIDDEN, so both answer true here.
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            AppError::Forbidden { .. } | AppError::CommentsDisabled { .. }
        )
    }

    /// INVALID_PARENT is a refinement of VALIDATION, so both answer true here.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Validation { .. } | AppError::InvalidParent { .. }
        )
    }

    /// Structured context for transport layers that render error envelopes.
    pub fn details(&self) -> BTreeMap<&'static str, String> {
        let mut details = BTreeMap::new();
        match self {
            AppError::Validation { field, .. } => {
                details.insert("field", field.clone());
            }
            AppError::NotFound { entity, id } => {
                details.insert("entity", entity.to_string());
                details.insert("id", id.to_string());
            }
            AppError::Forbidden { action } => {
                details.insert("action", action.clone());
            }
            AppError::CommentsDisabled { post_id } => {
                details.insert("post_id", post_id.to_string());
            }
            AppError::InvalidParent {
                parent_id,
                expected_post,
                actual_post,
            } => {
                details.insert("field", "parent_id".to_string());
                details.insert("parent_id", parent_id.to_string());
                details.insert("expected_post_id", expected_post.to_string());
                details.insert("actual_post_id", actual_post.to_string());
            }
            AppError::Internal { .. } => {}
        }
        details
    }
}

/// A specialized Result type for NestBoard logic.
pub type Result<T> = std::result::Result<T, AppError>;

/// Storage-layer error surfaced by repository implementations.
///
/// `NotFound` is the sentinel for absent rows; everything else is a backend
/// failure the service layer maps to [`AppError::Internal`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity not found")]
    NotFound,

    #[error("storage backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        StoreError::Backend(err.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
