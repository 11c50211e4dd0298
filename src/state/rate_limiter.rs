use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket bounding calls to the upstream feed. Starts full and refills
/// continuously at `capacity / interval`.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, interval: Duration) -> Self {
        let capacity = f64::from(capacity);
        let secs = interval.as_secs_f64();
        Self {
            capacity,
            refill_per_sec: if secs > 0.0 { capacity / secs } else { capacity },
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn per_minute(capacity: u32) -> Self {
        Self::new(capacity, Duration::from_secs(60))
    }

    /// Take `n` tokens if they are all available. Never waits.
    pub fn try_acquire(&self, n: u32) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        let wanted = f64::from(n);
        if bucket.tokens >= wanted {
            bucket.tokens -= wanted;
            true
        } else {
            false
        }
    }

    pub fn available(&self) -> u32 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        bucket.tokens.floor() as u32
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn second_acquire_within_the_minute_is_denied() {
        let limiter = RateLimiter::per_minute(1);
        assert!(limiter.try_acquire(1));
        assert!(!limiter.try_acquire(1));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!limiter.try_acquire(1));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.try_acquire(1));
    }

    #[tokio::test(start_paused = true)]
    async fn refill_never_exceeds_capacity() {
        let limiter = RateLimiter::per_minute(30);
        assert!(limiter.try_acquire(30));
        assert_eq!(limiter.available(), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(limiter.available(), 5);

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(limiter.available(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_request_takes_nothing() {
        let limiter = RateLimiter::per_minute(3);
        assert!(!limiter.try_acquire(4));
        assert_eq!(limiter.available(), 3);
        assert!(limiter.try_acquire(3));
    }
}
