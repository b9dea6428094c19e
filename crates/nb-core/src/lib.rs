//! # nb-core
//!
//! The central domain logic and interface definitions for NestBoard:
//! entities and validators, the hierarchical comment tree, the repository
//! and notifier contracts, the cursor codec, and the error taxonomy.

pub mod config;
pub mod cursor;
pub mod error;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use config::CoreConfig;
pub use cursor::{decode_cursor, encode_cursor};
pub use error::{AppError, ErrorKind, Result, StoreError, StoreResult};
pub use models::*;
pub use traits::*;
