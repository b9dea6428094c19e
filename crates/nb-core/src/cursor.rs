//! # Cursor codec
//!
//! Pagination cursors are the Base64 (standard alphabet, padded) encoding of
//! `"<unix_seconds>_<uuid>"`. The blob is opaque to clients; both halves are
//! stable under row mutation, so a cursor survives edits to everything except
//! `created_at` and the id itself.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Encodes an ordering key into an opaque cursor. Total: never fails.
pub fn encode_cursor(created_at: DateTime<Utc>, id: Uuid) -> String {
    STANDARD.encode(format!("{}_{}", created_at.timestamp(), id))
}

/// Decodes a cursor back into its ordering key.
///
/// Fails with a VALIDATION error on bad Base64, a missing separator, a
/// non-integer timestamp, an out-of-range timestamp, or a malformed UUID.
/// A cursor that decodes but no longer matches a live row is *not* an error;
/// callers treat it as a boundary.
pub fn decode_cursor(cursor: &str) -> Result<(DateTime<Utc>, Uuid)> {
    let invalid = |message: &str| AppError::validation("cursor", message);

    let bytes = STANDARD
        .decode(cursor)
        .map_err(|_| invalid("cursor is not valid base64"))?;
    let raw = String::from_utf8(bytes).map_err(|_| invalid("cursor is not valid utf-8"))?;

    let (seconds, id) = raw
        .split_once('_')
        .ok_or_else(|| invalid("cursor is missing its separator"))?;

    let seconds: i64 = seconds
        .parse()
        .map_err(|_| invalid("cursor timestamp is not an integer"))?;
    let created_at = DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| invalid("cursor timestamp is out of range"))?;

    let id = Uuid::parse_str(id).map_err(|_| invalid("cursor id is not a valid uuid"))?;

    Ok((created_at, id))
}
