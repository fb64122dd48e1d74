//! KeelDB common types, errors, and utilities.
//!
//! This crate provides shared definitions used across all KeelDB components.

pub mod cancel;
pub mod codec;
pub mod config;
pub mod error;
pub mod types;

pub use cancel::CancelToken;
pub use codec::Codec;
pub use config::StoreConfig;
pub use error::{KeelError, Result};
pub use types::{BlockId, FieldValue, RecordId};
