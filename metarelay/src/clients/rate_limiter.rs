//! Token bucket admission control for outbound upstream requests.
//!
//! Every call to the upstream provider must pass through a [`TokenBucket`]
//! before hitting the wire. The bucket allows short bursts up to `capacity`
//! requests and a sustained rate of `refill_rate` requests per second.
//! Acquisition never fails, it only delays the caller.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default burst capacity (tokens).
pub const DEFAULT_BURST_SIZE: u32 = 5;
/// Default sustained rate (tokens per second).
pub const DEFAULT_RATE: f64 = 2.0;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter.
///
/// All token accounting happens inside a single critical section; the lock
/// is held across the refill wait so a concurrent caller can never observe
/// a partial refill-then-deduct sequence or drive the bucket past capacity.
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket that starts full.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }

    /// Acquire `n` tokens, sleeping until they are available.
    ///
    /// Returns the time spent waiting (zero when the bucket had enough
    /// tokens on entry).
    pub async fn acquire(&self, n: u32) -> Duration {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        let needed = n as f64;
        let mut waited = Duration::ZERO;

        if state.tokens < needed {
            let deficit = needed - state.tokens;
            let wait = Duration::from_secs_f64(deficit / self.refill_rate);
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limit: waiting for tokens");
            tokio::time::sleep(wait).await;
            waited = wait;
            self.refill(&mut state);
        }

        state.tokens = (state.tokens - needed).max(0.0);
        waited
    }

    /// Try to acquire `n` tokens without waiting.
    pub async fn try_acquire(&self, n: u32) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        let needed = n as f64;
        if state.tokens >= needed {
            state.tokens -= needed;
            true
        } else {
            false
        }
    }

    /// Current token count, including refill accrued since the last call.
    ///
    /// Read-only projection; does not advance the bucket.
    pub async fn available(&self) -> f64 {
        let state = self.state.lock().await;
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        (state.tokens + elapsed * self.refill_rate).min(self.capacity)
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new(DEFAULT_BURST_SIZE, DEFAULT_RATE)
    }
}
