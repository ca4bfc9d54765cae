//! The remaining-budget abstraction that gates `maxTimeMS` attachment and retry eligibility
//! (spec §3 "Timeout Context", §5 "Cancellation & timeouts").

use std::time::{Duration, Instant};

use bson::Document;

use crate::error::{Error, Result};

/// Whether a cursor's timeout clock is reset before every `next` call, or runs for the whole
/// lifetime of the cursor (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutMode {
    CursorLifetime,
    Iteration,
}

/// Holds the remaining budget for a logical operation: a monotonic deadline plus the derived
/// `maxTimeMS` to attach to the next server call.
#[derive(Clone, Debug)]
pub struct TimeoutContext {
    default_timeout: Option<Duration>,
    deadline: Option<Instant>,
    max_time_override: Option<Duration>,
    mode: TimeoutMode,
}

impl TimeoutContext {
    pub fn new(default_timeout: Option<Duration>, mode: TimeoutMode) -> Self {
        let deadline = default_timeout.map(|d| Instant::now() + d);
        Self {
            default_timeout,
            deadline,
            max_time_override: None,
            mode,
        }
    }

    pub fn mode(&self) -> TimeoutMode {
        self.mode
    }

    /// Restarts the deadline from the configured default. Used when a new logical operation
    /// begins (e.g. at the start of a retried attempt).
    pub fn reset_to_defaults(&mut self) {
        self.deadline = self.default_timeout.map(|d| Instant::now() + d);
        self.max_time_override = None;
    }

    /// Restarts the per-iteration clock iff `mode == Iteration`; a no-op under
    /// `CursorLifetime`, per spec §3.
    pub fn reset_if_present(&mut self) {
        if self.mode == TimeoutMode::Iteration {
            self.reset_to_defaults();
        }
    }

    /// Pins an explicit `maxTimeMS` value for the next outgoing command, overriding the
    /// deadline-derived value.
    pub fn set_max_time_override(&mut self, ms: Duration) {
        self.max_time_override = Some(ms);
    }

    /// The remaining budget for the next blocking I/O call, if a deadline is configured.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline (if any) has already elapsed.
    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }

    pub fn check_not_expired(&self) -> Result<()> {
        if self.is_expired() {
            return Err(Error::operation_timeout(
                "operation deadline exceeded before the next attempt",
            ));
        }
        Ok(())
    }

    /// The `maxTimeMS` value (as a `Duration`) that should ride along on the next outgoing
    /// command: an explicit override if one is pinned, else the remaining deadline budget.
    pub fn effective_max_time(&self) -> Option<Duration> {
        self.max_time_override.or_else(|| self.remaining())
    }

    fn derived_max_time_ms(&self) -> Option<i64> {
        if let Some(ms) = self.max_time_override {
            return Some(ms.as_millis() as i64);
        }
        self.remaining().map(|d| d.as_millis() as i64)
    }

    /// Attaches `maxTimeMS` to the outgoing command unless the cursor is tailable (spec §3,
    /// §4.1) or no timeout is configured for this operation.
    pub fn put_max_time_ms(&self, cmd: &mut Document, tailable: bool) {
        if tailable {
            return;
        }
        if let Some(ms) = self.derived_max_time_ms() {
            cmd.insert("maxTimeMS", ms);
        }
    }
}

impl Default for TimeoutContext {
    fn default() -> Self {
        Self::new(None, TimeoutMode::Iteration)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn iteration_mode_resets_between_batches() {
        let mut ctx = TimeoutContext::new(Some(Duration::from_millis(500)), TimeoutMode::Iteration);
        std::thread::sleep(Duration::from_millis(10));
        let first = ctx.remaining().unwrap();
        ctx.reset_if_present();
        let second = ctx.remaining().unwrap();
        assert!(second >= first);
    }

    #[test]
    fn cursor_lifetime_mode_does_not_reset() {
        let mut ctx = TimeoutContext::new(Some(Duration::from_secs(10)), TimeoutMode::CursorLifetime);
        let before = ctx.remaining().unwrap();
        ctx.reset_if_present();
        let after = ctx.remaining().unwrap();
        assert!(after <= before);
    }

    #[test]
    fn tailable_cursor_never_gets_max_time_ms() {
        let ctx = TimeoutContext::new(Some(Duration::from_millis(500)), TimeoutMode::Iteration);
        let mut cmd = Document::new();
        ctx.put_max_time_ms(&mut cmd, true);
        assert!(!cmd.contains_key("maxTimeMS"));
    }
}
