//! Cooperative termination: cancellation token and wall-clock limit.
//!
//! The engine polls both at every iteration boundary. Nothing is preempted;
//! a stop request takes effect before the next opportunity is processed.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::TerminationReason;

/// Cheap cooperative cancellation token shared across threads.
#[derive(Clone, Default, Debug)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Token in the not-cancelled state.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Requests cancellation. Returns `true` only for the call that set it.
    #[inline]
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    /// Clears a pending request.
    #[inline]
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release)
    }
}

impl PartialEq for CancellationToken {
    /// Identity equality (same underlying flag), not current value.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for CancellationToken {}

impl fmt::Display for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CancellationToken(cancelled: {})", self.is_cancelled())
    }
}

/// Something the search loop asks whether to stop.
pub trait TerminationCheck {
    /// Reason to stop now, if any.
    fn should_terminate(&self) -> Option<TerminationReason>;
}

/// Wall-clock budget measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct TimeLimit {
    start_time: Instant,
    time_limit: Duration,
}

impl TimeLimit {
    /// Limit starting now.
    #[inline]
    pub fn new(time_limit: Duration) -> Self {
        Self::starting_at(Instant::now(), time_limit)
    }

    /// Limit measured from `start_time`.
    #[inline]
    pub fn starting_at(start_time: Instant, time_limit: Duration) -> Self {
        Self {
            start_time,
            time_limit,
        }
    }

    /// Whether the limit has passed.
    #[inline]
    pub fn expired(&self) -> bool {
        self.start_time.elapsed() >= self.time_limit
    }
}

impl TerminationCheck for TimeLimit {
    #[inline]
    fn should_terminate(&self) -> Option<TerminationReason> {
        self.expired().then_some(TerminationReason::TimeBudget)
    }
}

impl TerminationCheck for CancellationToken {
    #[inline]
    fn should_terminate(&self) -> Option<TerminationReason> {
        self.is_cancelled().then_some(TerminationReason::Cancelled)
    }
}

/// Stop conditions of one engine run. Cancellation wins over the time limit.
#[derive(Debug, Clone, Default)]
pub struct SearchControl {
    cancel: Option<CancellationToken>,
    time_limit: Option<TimeLimit>,
}

impl SearchControl {
    /// Never stops on its own.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Polls `token` for cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Stops once `limit` expires.
    pub fn with_time_limit(mut self, limit: TimeLimit) -> Self {
        self.time_limit = Some(limit);
        self
    }
}

impl TerminationCheck for SearchControl {
    fn should_terminate(&self) -> Option<TerminationReason> {
        self.cancel
            .as_ref()
            .and_then(TerminationCheck::should_terminate)
            .or_else(|| self.time_limit.as_ref().and_then(TerminationCheck::should_terminate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancellation_token_identity_and_behavior() {
        let a = CancellationToken::new();
        let b = a.clone();
        let c = CancellationToken::new();
        assert_eq!(a, b);
        assert_ne!(a, c);

        assert!(!a.is_cancelled());
        assert!(b.cancel());
        assert!(!a.cancel());
        assert!(a.is_cancelled());
        assert!(!c.is_cancelled());
        assert!(a.to_string().contains("cancelled: true"));

        a.reset();
        assert!(!b.is_cancelled());
    }

    #[test]
    fn test_time_limit_expires() {
        let long = TimeLimit::new(Duration::from_secs(60));
        assert_eq!(long.should_terminate(), None);
        let short = TimeLimit::new(Duration::from_millis(5));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(short.should_terminate(), Some(TerminationReason::TimeBudget));
    }

    #[test]
    fn test_search_control_prefers_cancellation() {
        let token = CancellationToken::new();
        let control = SearchControl::unbounded()
            .with_cancellation(token.clone())
            .with_time_limit(TimeLimit::new(Duration::ZERO));
        assert_eq!(control.should_terminate(), Some(TerminationReason::TimeBudget));
        token.cancel();
        assert_eq!(control.should_terminate(), Some(TerminationReason::Cancelled));
        assert_eq!(SearchControl::unbounded().should_terminate(), None);
    }
}
