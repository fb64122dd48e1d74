//! Ambient cancellation signal.

use crate::error::{KeelError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
///
/// Components hold a clone and check it at their suspension points (block
/// reads, queue submission, node fetches). Once fired the token stays fired;
/// every subsequent check fails with [`KeelError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    fired: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, unfired token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token. Idempotent.
    pub fn cancel(&self) {
        self.fired.store(true, Ordering::SeqCst);
    }

    /// Returns true if the token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Fails with `Cancelled` if the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(KeelError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_passes() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.check().unwrap();
    }

    #[test]
    fn test_fired_token_fails() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(KeelError::Cancelled)));
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
