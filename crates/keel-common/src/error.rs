//! Error types for KeelDB.

use thiserror::Error;

/// Result type alias using KeelError.
pub type Result<T> = std::result::Result<T, KeelError>;

/// Errors that can occur in KeelDB operations.
#[derive(Debug, Error)]
pub enum KeelError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Block store errors
    #[error("store disposed")]
    StoreDisposed,

    #[error("short read on block {block_id}: expected {expected} bytes, got {actual}")]
    ShortRead {
        block_id: u32,
        expected: usize,
        actual: usize,
    },

    #[error("short write on block {block_id}: expected {expected} bytes, wrote {actual}")]
    ShortWrite {
        block_id: u32,
        expected: usize,
        actual: usize,
    },

    #[error("bad block size: expected {expected}, got {actual}")]
    BadBlockSize { expected: usize, actual: usize },

    #[error("invalid store header: {0}")]
    InvalidHeader(String),

    // Index errors
    #[error("tree degree must be at least 2, got {0}")]
    BadDegree(usize),

    #[error("min/max requested on an empty index")]
    EmptyIndex,

    #[error("serialized node needs {needed} bytes but block size is {block_size}")]
    NodeOverflow { needed: usize, block_size: usize },

    #[error("index corrupted: {0}")]
    Corrupted(String),

    // Query errors
    #[error("predicate value for field '{field}' has type {value_type}, field is {field_type}")]
    PredicateTypeMismatch {
        field: String,
        field_type: String,
        value_type: String,
    },

    #[error("index references record {record_id} which record storage cannot resolve")]
    IndexInconsistency { record_id: i64 },

    // Lifecycle errors
    #[error("operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: KeelError = io_err.into();
        assert!(matches!(err, KeelError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_short_read_display() {
        let err = KeelError::ShortRead {
            block_id: 7,
            expected: 8192,
            actual: 100,
        };
        assert_eq!(
            err.to_string(),
            "short read on block 7: expected 8192 bytes, got 100"
        );
    }

    #[test]
    fn test_bad_block_size_display() {
        let err = KeelError::BadBlockSize {
            expected: 8192,
            actual: 4096,
        };
        assert_eq!(err.to_string(), "bad block size: expected 8192, got 4096");
    }

    #[test]
    fn test_bad_degree_display() {
        let err = KeelError::BadDegree(1);
        assert_eq!(err.to_string(), "tree degree must be at least 2, got 1");
    }

    #[test]
    fn test_node_overflow_display() {
        let err = KeelError::NodeOverflow {
            needed: 9000,
            block_size: 8192,
        };
        assert_eq!(
            err.to_string(),
            "serialized node needs 9000 bytes but block size is 8192"
        );
    }

    #[test]
    fn test_predicate_type_mismatch_display() {
        let err = KeelError::PredicateTypeMismatch {
            field: "age".to_string(),
            field_type: "int".to_string(),
            value_type: "string".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "predicate value for field 'age' has type string, field is int"
        );
    }

    #[test]
    fn test_index_inconsistency_display() {
        let err = KeelError::IndexInconsistency { record_id: 42 };
        assert_eq!(
            err.to_string(),
            "index references record 42 which record storage cannot resolve"
        );
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(KeelError::StoreDisposed)
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KeelError>();
    }
}
