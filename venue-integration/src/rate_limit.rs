use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, oneshot};

struct Waiter {
    tx: oneshot::Sender<()>,
}

struct Inner {
    capacity: usize,
    tokens: usize,
    interval: Duration,
    last_refill: Instant,
    waiters: VecDeque<Waiter>,
}

impl Inner {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        if elapsed < self.interval {
            return;
        }

        let periods = elapsed.as_millis() / self.interval.as_millis().max(1);
        self.last_refill = now;
        self.tokens = usize::min(self.tokens + (periods as usize + 1) * self.capacity, self.capacity);

        while self.tokens > 0 {
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            self.tokens -= 1;
            let _ = waiter.tx.send(());
        }
    }
}

/// A token-bucket rate limiter: `capacity` permits refilled every `interval`, queued
/// FIFO once exhausted.
///
/// A background ticker drives refills on a fixed schedule independent of caller
/// traffic, so a queued [`Waiter`] is granted its token even if nothing else calls
/// [`acquire`](Self::acquire) again before the next interval elapses. The ticker only
/// holds a [`Weak`] reference and exits once every [`RateLimiter`] handle is dropped.
///
/// Used here to cap the outbound SUBSCRIBE/UNSUBSCRIBE envelope rate per WS connection
/// at 10 per second.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Inner>>,
}

impl RateLimiter {
    pub fn new(capacity: usize, interval: Duration) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            capacity,
            tokens: capacity,
            interval,
            last_refill: Instant::now(),
            waiters: VecDeque::new(),
        }));

        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                inner.lock().await.refill();
            }
        });

        Self { inner }
    }

    /// Suspends until a permit is available.
    ///
    /// If capacity is exhausted this queues a [`Waiter`] and waits to be granted a
    /// token directly by a `refill()` pass (either the background ticker or a future
    /// caller) rather than re-entering the acquire/refill race, which would otherwise
    /// double-spend a token on every wakeup.
    pub async fn acquire(&self) {
        let rx = {
            let mut inner = self.inner.lock().await;
            inner.refill();
            if inner.tokens > 0 {
                inner.tokens -= 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                inner.waiters.push_back(Waiter { tx });
                Some(rx)
            }
        };

        if let Some(rx) = rx {
            let _ = rx.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn allows_capacity_immediately_then_queues() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn refills_after_interval_elapses() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(25)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }
}
