use std::time::{Duration, Instant};

/// Enforces a minimum interval between consecutive upstream requests
///
/// One throttle belongs to one renderer session; parallel sessions each keep
/// their own floor.
#[derive(Debug, Clone)]
pub struct Throttle {
    /// Minimum time between requests
    min_interval: Duration,

    /// Timestamp of the last request
    last_request_time: Option<Instant>,

    /// Number of requests made through this throttle
    pub request_count: u64,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request_time: None,
            request_count: 0,
        }
    }

    /// Returns None if a request can be made now, or the duration to wait otherwise
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.min_interval {
            Some(self.min_interval - elapsed)
        } else {
            None
        }
    }

    /// Records that a request was made at `now`
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Sleeps until the floor allows another request, then records it
    pub async fn wait(&mut self) {
        if let Some(wait) = self.time_until_next_request(Instant::now()) {
            tracing::trace!("Politeness floor: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        self.record_request(Instant::now());
    }
}
