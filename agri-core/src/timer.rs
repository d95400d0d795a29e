use std::time::Duration;
use tokio::time::Instant;

/// A one-shot, restartable deadline.
///
/// The timer owns no task: it only records when it is due. Whoever drives the
/// event loop sleeps until [`DebounceTimer::deadline`] and then calls
/// [`DebounceTimer::fire`]. Cancelling or dropping it leaves nothing behind
/// that could fire later.
#[derive(Debug, Clone)]
pub struct DebounceTimer {
    period: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new(period: Duration) -> Self {
        Self { period, deadline: None }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arm (or re-arm) the timer to expire one period after `now`.
    pub fn restart(&mut self, now: Instant) {
        self.deadline = Some(now + self.period);
    }

    /// Disarm. Returns whether the timer was armed.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` exactly once per arming, when `now` has reached the deadline.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Sleep until `deadline`, or forever when there is none.
///
/// Meant for a `tokio::select!` branch next to input and network events.
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
