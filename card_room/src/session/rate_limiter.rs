//! Sliding-window rate limiter.
//!
//! Used per connection for message flood protection and per identity
//! for join attempts. Windows are wall-clock; state is a ring of
//! recent timestamps.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    timestamps: VecDeque<Instant>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests),
            max_requests,
            window,
        }
    }

    /// Burst protection: 10 messages per second.
    pub fn burst() -> Self {
        Self::new(10, Duration::from_secs(1))
    }

    /// Sustained usage: 100 messages per minute.
    pub fn sustained() -> Self {
        Self::new(100, Duration::from_secs(60))
    }

    /// Seat-join attempts: 5 per 10 seconds per identity.
    pub fn joins() -> Self {
        Self::new(5, Duration::from_secs(10))
    }

    /// Record a request if allowed. Returns `false` when over the limit.
    pub fn check(&mut self) -> bool {
        let now = Instant::now();
        while let Some(ts) = self.timestamps.front() {
            if now.duration_since(*ts) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        if self.timestamps.len() >= self.max_requests {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }

    pub fn remaining(&self) -> usize {
        self.max_requests.saturating_sub(self.timestamps.len())
    }
}
