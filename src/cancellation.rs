//! Cooperative run cancellation: a CancellationToken plus an optional
//! wall-clock deadline. Work checks it between entries, never mid-call.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared stop signal for one run. Cloning shares the same token.
#[derive(Clone, Debug)]
pub struct RunDeadline {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunDeadline {
    /// Deadline `timeout` from now; `None` never expires on its own.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once cancelled or past the deadline. Passing the deadline cancels
    /// the token so every holder observes it.
    pub fn is_expired(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                info!("run deadline reached");
                self.token.cancel();
                true
            }
            _ => false,
        }
    }
}

impl Default for RunDeadline {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Checks a deadline only every `every` entries to keep the loop cheap.
#[derive(Debug)]
pub struct DeadlineCheck {
    deadline: RunDeadline,
    every: usize,
    seen: usize,
}

impl DeadlineCheck {
    pub fn new(deadline: RunDeadline, every: usize) -> Self {
        Self {
            deadline,
            every: every.max(1),
            seen: 0,
        }
    }

    /// Count one entry; true when a check was due and the deadline has passed.
    #[inline]
    pub fn tick(&mut self) -> bool {
        self.seen += 1;
        self.seen % self.every == 0 && self.deadline.is_expired()
    }
}
