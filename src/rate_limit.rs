use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Spaces calls evenly so that at most `calls_per_second` start in any second.
///
/// Clones share one schedule. Each caller reserves the next free slot and
/// sleeps until it, so concurrent callers are served in arrival order.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    period: Duration,
    next_slot: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    pub fn per_second(calls_per_second: u32) -> Self {
        RateLimiter {
            period: Duration::from_secs(1) / calls_per_second.max(1),
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.period);
            slot
        };
        sleep_until(slot).await;
    }
}
