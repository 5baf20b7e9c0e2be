//! Flush scheduling: size threshold and inactivity deadline.
//!
//! Two independent triggers decide when the buffer is drained: a size
//! trigger checked synchronously on every add, and a debounced idle deadline
//! that is re-armed by every add and cancelled when a flush begins.
//! Deadlines are `tokio::time::Instant`s so tests drive them with paused
//! time instead of real wall time.

use std::time::Duration;

use tokio::time::Instant;

/// Thresholds controlling when the buffer is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Buffer length at which a flush fires immediately (inclusive).
    pub max_batch_size: usize,
    /// Inactivity period after which buffered events are flushed.
    pub idle_timeout: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            idle_timeout: Duration::from_millis(5_000),
        }
    }
}

/// Why a flush fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The buffer reached the size threshold.
    Size,
    /// No event arrived before the idle deadline.
    Idle,
    /// An external caller requested the flush.
    Explicit,
}

impl std::fmt::Display for FlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Size => write!(f, "size"),
            Self::Idle => write!(f, "idle"),
            Self::Explicit => write!(f, "explicit"),
        }
    }
}

/// Decides when the buffer should be drained.
#[derive(Debug)]
pub struct FlushScheduler {
    policy: FlushPolicy,
    deadline: Option<Instant>,
}

impl FlushScheduler {
    /// Create a scheduler with the given policy.
    #[must_use]
    pub fn new(policy: FlushPolicy) -> Self {
        Self {
            policy,
            deadline: None,
        }
    }

    /// The policy this scheduler applies.
    #[must_use]
    pub fn policy(&self) -> &FlushPolicy {
        &self.policy
    }

    /// Record that an event was buffered at `now`.
    ///
    /// Re-arms the idle deadline and returns `true` if the buffer length has
    /// reached the size threshold, meaning a flush must fire right away.
    pub fn note_event(&mut self, buffered: usize, now: Instant) -> bool {
        self.deadline = Some(now + self.policy.idle_timeout);
        buffered >= self.policy.max_batch_size
    }

    /// The pending idle deadline, if armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check if the idle deadline is armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Cancel the pending idle deadline. Called when a flush begins so the
    /// timer never fires against an already-drained buffer.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }
}
