use rand::Rng;
use std::time::Duration;

/// Bounded exponential backoff with jitter for lock contention.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            next: base,
            max: max.max(base),
        }
    }

    pub async fn wait(&mut self) {
        let jitter_ceiling = (self.next.as_millis() / 4) as u64;
        let jitter = if jitter_ceiling == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ceiling)
        };
        tokio::time::sleep(self.next + Duration::from_millis(jitter)).await;
        self.next = (self.next * 2).min(self.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    async fn timed_wait(backoff: &mut Backoff) -> Duration {
        let started = Instant::now();
        backoff.wait().await;
        started.elapsed()
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_up_to_max() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(35));

        // Each wait adds at most a quarter of its delay as jitter.
        let bounds = [(10, 12), (20, 25), (35, 43), (35, 43)];
        for (low, high) in bounds {
            let waited = timed_wait(&mut backoff).await;
            assert!(waited >= Duration::from_millis(low), "{waited:?} < {low}ms");
            assert!(waited <= Duration::from_millis(high + 1), "{waited:?} > {high}ms");
        }
    }
}
