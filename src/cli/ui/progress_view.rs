use std::fmt::{self, Display, Formatter};

use crate::scan::ScanProgress;
use crate::utils::format_percent;

use super::painter::Painter;

/// Renders one published progress record as a single line.
pub(crate) struct ProgressView<'a> {
    progress: &'a ScanProgress,
    painter: &'a Painter,
}

impl<'a> ProgressView<'a> {
    pub(crate) fn new(progress: &'a ScanProgress, painter: &'a Painter) -> Self {
        Self { progress, painter }
    }
}

impl Display for ProgressView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let progress = self.progress;
        let status = progress
            .status()
            .map_or_else(|| "-".to_string(), |status| status.to_string());
        let state = progress
            .device_state()
            .map_or_else(|| self.painter.muted("-"), |state| self.painter.state(state));

        write!(
            f,
            "{} {state} {}/{} {}",
            self.painter.muted(format!("[{status}]")),
            progress.point(),
            progress.size(),
            self.painter
                .value(format_percent(progress.percent_complete())),
        )?;
        if let Some(message) = progress.message() {
            write!(f, " {}", self.painter.muted(message))?;
        }
        Ok(())
    }
}
