use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Enforces a minimum spacing between consecutive requests.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `interval` has passed since the previous call returned.
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                debug!(
                    "Throttling analysis request for {:?}",
                    ready_at - Instant::now()
                );
                sleep_until(ready_at).await;
            }
        }

        *last = Some(Instant::now());
    }
}
