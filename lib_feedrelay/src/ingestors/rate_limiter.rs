//! Burst pacing for the poll loop: after `max_rate` acquisitions inside one
//! window, callers are told to wait `pause` before the next one. The count
//! starts over once the pause has been served or the window runs out.

use std::time::Duration;

use tokio::time::Instant;

/// Answer to [`RateLimiter::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// Go ahead; the acquisition was counted.
    Allowed,
    /// Ask again after this long.
    WaitFor(Duration),
}

/// Owned limiter state. Not shared; the poll cycle holds it for its duration.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_rate: u32,
    window: Duration,
    pause: Duration,
    count: u32,
    window_start: Option<Instant>,
    paused_until: Option<Instant>,
}

impl RateLimiter {
    /// `max_rate` is clamped to at least one.
    pub fn new(max_rate: u32, window: Duration, pause: Duration) -> Self {
        Self {
            max_rate: max_rate.max(1),
            window,
            pause,
            count: 0,
            window_start: None,
            paused_until: None,
        }
    }

    /// Counts one acquisition at `now`, or says how long to wait first.
    pub fn try_acquire(&mut self, now: Instant) -> Acquire {
        if let Some(until) = self.paused_until {
            if now < until {
                return Acquire::WaitFor(until - now);
            }
            self.paused_until = None;
            self.restart(now);
        }

        match self.window_start {
            Some(start) if now.duration_since(start) < self.window => {}
            _ => self.restart(now),
        }

        if self.count < self.max_rate {
            self.count += 1;
            Acquire::Allowed
        } else {
            self.paused_until = Some(now + self.pause);
            Acquire::WaitFor(self.pause)
        }
    }

    /// Waits as long as needed, then counts one acquisition.
    pub async fn acquire(&mut self) {
        loop {
            match self.try_acquire(Instant::now()) {
                Acquire::Allowed => return,
                Acquire::WaitFor(wait) => {
                    tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, pausing");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn restart(&mut self, now: Instant) {
        self.count = 0;
        self.window_start = Some(now);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(4), Duration::from_secs(2))
    }
}
