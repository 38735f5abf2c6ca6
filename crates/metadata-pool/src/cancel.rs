//! Cancellation tokens for pool loads.
//!
//! Tokens are cheap to clone and share one flag. Checks are best-effort:
//! the loader looks at the token between location groups and, sparsely,
//! between source files.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How often per-file loops should check whether the load was cancelled.
/// Using a power of 2 allows efficient modulo via bitwise AND.
pub const CANCEL_CHECK_INTERVAL: usize = 0x40;

/// A cancellation token for terminating long-running loads.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is never cancelled.
    #[inline]
    pub fn noop() -> Self {
        Self::default()
    }

    /// Requests cancellation for every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Checks if this token is still active.
    ///
    /// Returns `Some(())` if still active, `None` if cancelled.
    /// This enables use with the `?` operator for early returns.
    #[inline]
    pub fn is_cancelled(&self) -> Option<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            None
        } else {
            Some(())
        }
    }

    /// Sparse cancellation check - only checks every `CANCEL_CHECK_INTERVAL` iterations.
    #[inline]
    pub fn is_cancelled_sparse(&self, counter: usize) -> Option<()> {
        if counter & (CANCEL_CHECK_INTERVAL - 1) == 0 {
            self.is_cancelled()
        } else {
            Some(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_token_is_never_cancelled() {
        let token = CancellationToken::noop();
        assert!(token.is_cancelled().is_some());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled().is_none());
    }

    #[test]
    fn sparse_check_skips_between_intervals() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled_sparse(1).is_some());
        assert!(token.is_cancelled_sparse(CANCEL_CHECK_INTERVAL).is_none());
    }
}
