//! Deadlines and cooperative cancellation
//!
//! Every discovery run carries a `RunContext`: an optional monotonic
//! deadline plus a shared cancellation flag. Algorithmic code polls it at
//! fixed iteration counts (Tarjan: every 2000 nodes, Johnson: every 1024
//! pushes) and returns partial results marked truncated when it fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a run stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// The monotonic deadline passed
    Deadline,

    /// The cancellation flag was raised
    Cancelled,
}

/// Shared cancellation flag, cloned into every worker touching one job
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Deadline + cancellation context threaded through a discovery run
#[derive(Debug, Clone)]
pub struct RunContext {
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl RunContext {
    /// No deadline, fresh cancellation token
    pub fn unbounded() -> Self {
        Self {
            deadline: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_timeout(budget: Duration) -> Self {
        Self::with_deadline(Instant::now() + budget)
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Poll for an interruption. Cancellation wins over deadline so an
    /// operator cancel is reported as such even after expiry.
    pub fn check(&self) -> Option<Interruption> {
        if self.cancel.is_cancelled() {
            return Some(Interruption::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interruption::Deadline),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_never_interrupts() {
        assert_eq!(RunContext::unbounded().check(), None);
    }

    #[test]
    fn expired_deadline_interrupts() {
        let ctx = RunContext::with_deadline(Instant::now() - Duration::from_millis(1));
        assert_eq!(ctx.check(), Some(Interruption::Deadline));
    }

    #[test]
    fn cancellation_wins_over_deadline() {
        let ctx = RunContext::with_deadline(Instant::now() - Duration::from_millis(1));
        ctx.cancel_token().cancel();
        assert_eq!(ctx.check(), Some(Interruption::Cancelled));
    }
}
