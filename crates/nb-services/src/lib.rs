//! # nb-services
//!
//! The business-logic layer of NestBoard: post and comment services over the
//! repository contract, the pub/sub subscription service that fans comment
//! lifecycle events out to live subscribers, and the manager that wires the
//! three together.

mod comment;
mod manager;
mod pagination;
mod post;
mod subscription;

pub use comment::CommentService;
pub use manager::{ServiceManager, Services};
pub use post::PostService;
pub use subscription::{CommentStream, SubscriptionMetrics, SubscriptionService};

use nb_core::error::{AppError, StoreError};
use uuid::Uuid;

/// Maps a repository failure into the domain taxonomy: the not-found
/// sentinel becomes NOT_FOUND for the entity at hand, everything else is
/// INTERNAL with the action for context.
pub(crate) fn map_store_err(
    err: StoreError,
    entity: &'static str,
    id: Uuid,
    action: &str,
) -> AppError {
    match err {
        StoreError::NotFound => AppError::not_found(entity, id),
        StoreError::Backend(source) => AppError::internal(format!("failed to {action}: {source}")),
    }
}
