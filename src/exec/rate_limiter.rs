//! Token-bucket rate limiter
//!
//! Paces per-host probe traffic. Tokens refill continuously at the configured
//! rate and are clamped to `[0, rate]`; `acquire` waits until a token is
//! available. Concurrent acquirers are served in no particular order, each
//! eventually proceeds under continuous refill.

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Shared token bucket, `requests_per_second` tokens per second
pub struct RateLimiter {
    rate: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let rate = requests_per_second.max(0.01);
        Self {
            rate,
            state: Mutex::new(BucketState {
                // Start with a single token so the very first probe goes out
                // immediately without granting a full-bucket burst.
                tokens: 1.0,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Block until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate).min(self.rate);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.rate)
            };
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn completions_in_a_second_stay_within_rate_plus_one() {
        let limiter = Arc::new(RateLimiter::new(5.0));
        let served = Arc::new(AtomicUsize::new(0));

        for _ in 0..30 {
            let limiter = limiter.clone();
            let served = served.clone();
            tokio::spawn(async move {
                limiter.acquire().await;
                served.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(served.load(Ordering::SeqCst) <= 6, "served {}", served.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn all_acquirers_eventually_proceed() {
        let limiter = Arc::new(RateLimiter::new(10.0));
        let served = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let limiter = limiter.clone();
                let served = served.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    served.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_secs(5)).await;
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(served.load(Ordering::SeqCst), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_are_clamped_to_rate() {
        let limiter = RateLimiter::new(2.0);
        // A long idle period must not bank more than `rate` tokens.
        tokio::time::sleep(Duration::from_secs(60)).await;

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        // Third acquire had to wait for a refill.
        assert!(start.elapsed() >= Duration::from_millis(400));
    }
}
