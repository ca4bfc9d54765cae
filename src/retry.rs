//! Retry Controller (spec §2, §4.2) and the consolidated `ErrorClassifier` spec §9 calls for:
//! "Retryable-error classification scattered across helpers... Consolidate as a single
//! `ErrorClassifier` with three pure predicates."

use crate::{
    error::Error,
    session::TransactionState,
};

/// Three pure predicates, each taking the failure plus the ambient facts needed to classify it,
/// so call sites never hand-roll their own retry logic (spec §9).
pub(crate) struct ErrorClassifier;

impl ErrorClassifier {
    /// Spec §4.2 read-retry predicate.
    pub(crate) fn is_retryable_read(
        error: &Error,
        retry_reads_enabled: bool,
        transaction_state: TransactionState,
    ) -> bool {
        if !retry_reads_enabled || transaction_state.is_active() {
            return false;
        }
        error.is_read_retryable()
    }

    /// Spec §4.2 write-retry predicate. `supports_sessions` and `is_standalone` are checked by
    /// the caller before invoking this (they gate whether a retry attempt is even constructible,
    /// not whether the *error itself* looks retryable).
    pub(crate) fn is_retryable_write(
        error: &Error,
        retry_writes_enabled: bool,
        is_acknowledged: bool,
        transaction_state: TransactionState,
    ) -> bool {
        if !retry_writes_enabled || !is_acknowledged {
            return false;
        }
        if transaction_state == TransactionState::InProgress {
            return false;
        }
        error.is_write_retryable() || error.is_network_error()
    }

    /// Spec §4.5 resumable-error predicate for change streams.
    pub(crate) fn is_resumable_change_stream(error: &Error) -> bool {
        error.is_resumable()
    }
}

/// Drives at-most-one retry per logical operation (spec §3 invariant 4, §8 testable property 2):
/// classify the failure, and if it's retryable, signal that a second attempt should be made
/// against a freshly selected server. A third failure is never retried again.
pub(crate) struct RetryController {
    attempted: bool,
}

impl RetryController {
    pub(crate) fn new() -> Self {
        Self { attempted: false }
    }

    /// Returns `true` iff the caller should make another attempt. Consumes the single retry
    /// budget: calling this twice after two failures will return `false` the second time.
    pub(crate) fn should_retry(&mut self, retryable: bool) -> bool {
        if self.attempted || !retryable {
            return false;
        }
        self.attempted = true;
        true
    }

    pub(crate) fn has_retried(&self) -> bool {
        self.attempted
    }
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn retries_exactly_once() {
        let mut controller = RetryController::new();
        assert!(controller.should_retry(true));
        // A second retryable failure after the budget is spent must not retry again (spec §8.2).
        assert!(!controller.should_retry(true));
    }

    #[test]
    fn non_retryable_failure_never_retries() {
        let mut controller = RetryController::new();
        assert!(!controller.should_retry(false));
        assert!(!controller.has_retried());
    }
}
