use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Why a run was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    Cancelled,
    TimedOut,
}

const NOT_INTERRUPTED: u8 = 0;
const CANCELLED: u8 = 1;
const TIMED_OUT: u8 = 2;

/// Stop signal polled by the interpreter while a script runs.
///
/// It trips on whichever comes first, an external cancellation or the
/// deadline, and remembers that first reason for the rest of the run.
#[derive(Debug)]
pub struct Interrupt {
    cancel: CancellationToken,
    deadline: Instant,
    limit: Duration,
    reason: AtomicU8,
}

impl Interrupt {
    pub fn new(cancel: CancellationToken, limit: Duration) -> Self {
        Self {
            cancel,
            deadline: Instant::now() + limit,
            limit,
            reason: AtomicU8::new(NOT_INTERRUPTED),
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Returns `true` once the run must stop. Cheap enough to be called from
    /// the interpreter's interrupt hook.
    pub fn should_stop(&self) -> bool {
        if self.reason.load(Ordering::Acquire) != NOT_INTERRUPTED {
            return true;
        }
        let tripped = if self.cancel.is_cancelled() {
            CANCELLED
        } else if Instant::now() >= self.deadline {
            TIMED_OUT
        } else {
            return false;
        };
        // Lose the race gracefully if another check already recorded a reason
        let _ = self.reason.compare_exchange(
            NOT_INTERRUPTED,
            tripped,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        true
    }

    pub fn reason(&self) -> Option<InterruptReason> {
        match self.reason.load(Ordering::Acquire) {
            CANCELLED => Some(InterruptReason::Cancelled),
            TIMED_OUT => Some(InterruptReason::TimedOut),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_interrupt_does_not_trip() {
        let interrupt = Interrupt::new(CancellationToken::new(), Duration::from_secs(60));
        assert!(!interrupt.should_stop());
        assert_eq!(interrupt.reason(), None);
    }

    #[test]
    fn test_cancellation_trips() {
        let token = CancellationToken::new();
        let interrupt = Interrupt::new(token.clone(), Duration::from_secs(60));

        token.cancel();
        assert!(interrupt.should_stop());
        assert_eq!(interrupt.reason(), Some(InterruptReason::Cancelled));
    }

    #[test]
    fn test_deadline_trips() {
        let interrupt = Interrupt::new(CancellationToken::new(), Duration::ZERO);
        assert!(interrupt.should_stop());
        assert_eq!(interrupt.reason(), Some(InterruptReason::TimedOut));
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        let interrupt = Interrupt::new(token.clone(), Duration::ZERO);

        assert!(interrupt.should_stop());
        token.cancel();
        assert!(interrupt.should_stop());
        assert_eq!(interrupt.reason(), Some(InterruptReason::TimedOut));
    }
}
