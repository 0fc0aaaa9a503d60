mod progress;
mod publisher;

pub use self::progress::{ScanProgress, ScanProgressUpdate, ScanStatus};
pub use self::publisher::{BroadcastPublisher, ScanProgressPublisher};
