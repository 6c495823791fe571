//! Bounded busy-waiting for FIFO readiness

use crate::error::{BusError, Result};
use crate::hardware::PioHardware;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared flag that aborts a bounded wait
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an untriggered token
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort every wait holding a clone of this token
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check if the token was triggered
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the token for reuse
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Limits on how long a blocking transfer may spin
///
/// The default waits forever, like the unbounded calls.
#[derive(Debug, Clone, Default)]
pub struct WaitPolicy {
    deadline: Option<Instant>,
    max_polls: Option<u64>,
    cancel: Option<CancelToken>,
}

impl WaitPolicy {
    /// No limit
    pub fn forever() -> Self {
        Self::default()
    }

    /// Give up at `deadline`
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Give up after `timeout` from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Give up after `polls` unsuccessful status checks
    pub fn with_max_polls(mut self, polls: u64) -> Self {
        self.max_polls = Some(polls);
        self
    }

    /// Give up when `token` is cancelled
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Spin until `ready` holds, calling [`PioHardware::idle`] between polls
    ///
    /// Cancellation is checked before the deadline, the deadline before
    /// the poll budget.
    pub fn wait_until<H, F>(&self, hw: &mut H, mut ready: F) -> Result<()>
    where
        H: PioHardware,
        F: FnMut(&H) -> bool,
    {
        let mut polls = 0u64;
        loop {
            if ready(&*hw) {
                return Ok(());
            }
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(BusError::Cancelled);
            }
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(BusError::Timeout);
            }
            polls += 1;
            if self.max_polls.is_some_and(|max| polls > max) {
                return Err(BusError::Timeout);
            }
            hw.idle();
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LaneId;
    use crate::sim::{SimConfig, SimulatedPio};

    const LANE: LaneId = LaneId { engine: 0, lane: 0 };

    fn stalled() -> SimulatedPio {
        SimulatedPio::new(SimConfig {
            free_running: false,
            ..SimConfig::default()
        })
    }

    #[test]
    fn test_ready_returns_immediately() {
        let mut hw = stalled();
        let policy = WaitPolicy::forever().with_max_polls(0);
        assert_eq!(policy.wait_until(&mut hw, |_| true), Ok(()));
    }

    #[test]
    fn test_poll_budget() {
        let mut hw = stalled();
        let mut calls = 0;
        let policy = WaitPolicy::forever().with_max_polls(5);
        let result = policy.wait_until(&mut hw, |h| {
            calls += 1;
            h.rx_fifo_level(LANE) > 0
        });
        assert_eq!(result, Err(BusError::Timeout));
        assert_eq!(calls, 6);
    }

    #[test]
    fn test_deadline_in_past() {
        let mut hw = stalled();
        let policy = WaitPolicy::forever().with_deadline(Instant::now());
        assert_eq!(policy.wait_until(&mut hw, |_| false), Err(BusError::Timeout));
    }

    #[test]
    fn test_timeout_elapses() {
        let mut hw = stalled();
        let start = Instant::now();
        let policy = WaitPolicy::forever().with_timeout(Duration::from_millis(5));
        assert_eq!(policy.wait_until(&mut hw, |_| false), Err(BusError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_cancel_wins_over_timeout() {
        let mut hw = stalled();
        let token = CancelToken::new();
        token.cancel();
        let policy = WaitPolicy::forever()
            .with_max_polls(0)
            .with_cancel(token.clone());
        assert_eq!(policy.wait_until(&mut hw, |_| false), Err(BusError::Cancelled));

        token.reset();
        assert!(!token.is_cancelled());
        assert_eq!(policy.wait_until(&mut hw, |_| false), Err(BusError::Timeout));
    }

    #[test]
    fn test_cancel_from_inside_wait() {
        let mut hw = stalled();
        let token = CancelToken::new();
        let trigger = token.clone();
        let mut polls = 0;
        let policy = WaitPolicy::forever().with_cancel(token);
        let result = policy.wait_until(&mut hw, |_| {
            polls += 1;
            if polls == 3 {
                trigger.cancel();
            }
            false
        });
        assert_eq!(result, Err(BusError::Cancelled));
        assert_eq!(polls, 3);
    }
}
