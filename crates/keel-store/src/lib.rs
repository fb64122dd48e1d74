//! Block storage for KeelDB.
//!
//! A store is a single file divided into fixed-size blocks. Block 0 holds
//! the store header; the remaining blocks hold tree nodes and free-list
//! chain entries. Writes are drained asynchronously by a single writer task
//! fed from a bounded queue; reads go straight to the file.

pub mod header;
mod pipeline;
pub mod store;

pub use header::StoreHeader;
pub use store::{BlockStore, StoreStats};
