use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

use super::ScanProgress;

const DEFAULT_CAPACITY: usize = 256;

/// Fire-and-forget sink for scan-progress records.
pub trait ScanProgressPublisher: Send + Sync {
    fn broadcast(&self, progress: &ScanProgress);
}

/// Fans records out to every current subscriber over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<ScanProgress>,
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a publisher whose subscribers lag after `capacity` unread records.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receives every record published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.sender.subscribe()
    }

    /// Stream view of [`BroadcastPublisher::subscribe`].
    #[must_use]
    pub fn progress_stream(&self) -> BroadcastStream<ScanProgress> {
        BroadcastStream::new(self.subscribe())
    }
}

impl ScanProgressPublisher for BroadcastPublisher {
    fn broadcast(&self, progress: &ScanProgress) {
        if self.sender.send(progress.clone()).is_err() {
            trace!(device = progress.device_name(), "no progress subscribers");
        }
    }
}
