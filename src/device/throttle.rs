use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::utils::lock;

/// Minimum-interval gate; calls inside the window are rejected, not queued.
#[derive(Debug)]
pub(crate) struct Throttle {
    interval: Duration,
    last_pass: Mutex<Option<Instant>>,
}

impl Throttle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_pass: Mutex::new(None),
        }
    }

    /// Returns `true` and restarts the window when at least one interval has
    /// elapsed since the last accepted call.
    pub(crate) fn try_pass(&self) -> bool {
        let now = Instant::now();
        let mut last_pass = lock(&self.last_pass);
        match *last_pass {
            Some(previous) if now.duration_since(previous) < self.interval => false,
            _ => {
                *last_pass = Some(now);
                true
            }
        }
    }
}
