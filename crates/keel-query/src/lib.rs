//! Query front end for KeelDB.
//!
//! Given a predicate tree, the engine picks between an index-driven path
//! (equality, open range, closed range) and a full scan of record storage,
//! producing a lazily resolved stream of records.

pub mod engine;
pub mod predicate;
pub mod record;

pub use engine::{QueryEngine, RecordStream};
pub use predicate::{CompareOp, Predicate};
pub use record::{MemoryRecordStore, Record, RecordStore};
