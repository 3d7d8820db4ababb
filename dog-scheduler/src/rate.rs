use std::collections::VecDeque;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimit;

/// Proof that one action slot was taken from the window at `taken_at`
#[derive(Debug)]
pub struct RateToken {
    taken_at: Instant,
}

/// Global rolling-window rate limiter shared by all workers.
///
/// Check-and-record happens under one lock, so concurrent callers can never
/// push the number of slots taken in any window past `max`.
pub struct RateLimiter {
    limit: RateLimit,
    taken: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            taken: Mutex::new(VecDeque::new()),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Take a slot if one is free, otherwise return how long until the oldest expires
    pub fn try_acquire(&self) -> Result<RateToken, Duration> {
        let now = Instant::now();
        let mut taken = self.taken.lock();

        while let Some(oldest) = taken.front() {
            if now.duration_since(*oldest) >= self.limit.window {
                taken.pop_front();
            } else {
                break;
            }
        }

        if taken.len() < self.limit.max as usize {
            taken.push_back(now);
            return Ok(RateToken { taken_at: now });
        }

        let wait = taken
            .front()
            .map(|oldest| (*oldest + self.limit.window).saturating_duration_since(now))
            .unwrap_or_default();
        Err(wait.max(Duration::from_millis(1)))
    }

    /// Wait until a slot is free and take it
    pub async fn acquire(&self) -> RateToken {
        loop {
            match self.try_acquire() {
                Ok(token) => return token,
                Err(wait) => {
                    debug!("Rate limit reached, waiting {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Give back a slot that was taken but not used
    pub fn refund(&self, token: RateToken) {
        let mut taken = self.taken.lock();
        if let Some(index) = taken.iter().rposition(|at| *at == token.taken_at) {
            taken.remove(index);
        }
    }

    /// Slots taken in the current window
    pub fn in_window(&self) -> usize {
        let now = Instant::now();
        self.taken
            .lock()
            .iter()
            .filter(|at| now.duration_since(**at) < self.limit.window)
            .count()
    }
}
