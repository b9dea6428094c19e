//! Shared pagination plumbing for the list endpoints.

use chrono::{DateTime, Utc};
use nb_core::cursor::{decode_cursor, encode_cursor};
use nb_core::error::{AppError, Result};
use nb_core::models::{Connection, Edge, PageInfo, PaginationInput};
use uuid::Uuid;

/// Validates the Relay-style arguments: `first`/`last` within `[0, max]`
/// when present, never both at once, and any supplied cursor must decode.
pub(crate) fn validate_pagination(pagination: &PaginationInput, max_page_size: i32) -> Result<()> {
    if let Some(first) = pagination.first {
        if first < 0 {
            return Err(AppError::validation("first", "first must be non-negative"));
        }
        if first > max_page_size {
            return Err(AppError::validation(
                "first",
                format!("first cannot exceed {max_page_size}"),
            ));
        }
    }

    if let Some(last) = pagination.last {
        if last < 0 {
            return Err(AppError::validation("last", "last must be non-negative"));
        }
        if last > max_page_size {
            return Err(AppError::validation(
                "last",
                format!("last cannot exceed {max_page_size}"),
            ));
        }
    }

    if pagination.first.is_some() && pagination.last.is_some() {
        return Err(AppError::validation(
            "pagination",
            "cannot specify both first and last",
        ));
    }

    if let Some(after) = &pagination.after {
        decode_cursor(after)?;
    }
    if let Some(before) = &pagination.before {
        decode_cursor(before)?;
    }

    Ok(())
}

/// The window size a request translates to at the repository.
pub(crate) fn requested_limit(pagination: &PaginationInput, default_size: i32) -> usize {
    pagination
        .first
        .or(pagination.last)
        .unwrap_or(default_size) as usize
}

/// Builds a connection out of a fetched window.
///
/// `has_next_page` comes from the filtered total: a forward page is full
/// (`edges.len() == first`) and more rows exist beyond it
/// (`total > first`). `has_previous_page` is the symmetric backward check.
pub(crate) fn build_connection<T>(
    nodes: Vec<T>,
    pagination: &PaginationInput,
    total: usize,
    key: impl Fn(&T) -> (DateTime<Utc>, Uuid),
) -> Connection<T> {
    let edges: Vec<Edge<T>> = nodes
        .into_iter()
        .map(|node| {
            let (created_at, id) = key(&node);
            Edge {
                cursor: encode_cursor(created_at, id),
                node,
            }
        })
        .collect();

    let mut page_info = PageInfo {
        start_cursor: edges.first().map(|edge| edge.cursor.clone()),
        end_cursor: edges.last().map(|edge| edge.cursor.clone()),
        ..PageInfo::default()
    };

    if let Some(first) = pagination.first {
        page_info.has_next_page = edges.len() == first as usize && total > first as usize;
    }
    if let Some(last) = pagination.last {
        page_info.has_previous_page = edges.len() == last as usize && total > last as usize;
    }

    Connection { edges, page_info }
}
