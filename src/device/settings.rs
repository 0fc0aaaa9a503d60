use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use bon::Builder;

/// Minimum spacing between published progress records.
pub const DEFAULT_PROGRESS_THROTTLE: Duration = Duration::from_millis(250);

/// Per-controller tuning knobs.
#[derive(Debug, Clone, Builder)]
pub struct DeviceSettings {
    /// Minimum time between two forwarded `completedSteps` updates.
    #[builder(default = DEFAULT_PROGRESS_THROTTLE)]
    progress_throttle: Duration,
    /// Pause before re-reading `state` after the connection comes back.
    #[builder(default)]
    reconnect_fetch_delay: Duration,
    /// Output file template; `%s` is replaced remotely by the dataset name.
    #[builder(into)]
    file_template: Option<String>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DeviceSettings {
    #[must_use]
    pub fn progress_throttle(&self) -> Duration {
        self.progress_throttle
    }

    #[must_use]
    pub fn reconnect_fetch_delay(&self) -> Duration {
        self.reconnect_fetch_delay
    }

    /// File template for scans written under `file_dir`, defaulting to
    /// `<last component of file_dir>-%s.h5`.
    #[must_use]
    pub fn file_template_for(&self, file_dir: &str) -> String {
        self.file_template.clone().unwrap_or_else(|| {
            let base = Path::new(file_dir)
                .file_name()
                .and_then(OsStr::to_str)
                .unwrap_or_default();
            format!("{base}-%s.h5")
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_use_quarter_second_throttle() {
        let settings = DeviceSettings::default();
        assert_eq!(DEFAULT_PROGRESS_THROTTLE, settings.progress_throttle());
        assert_eq!(Duration::ZERO, settings.reconnect_fetch_delay());
        assert_eq!(
            "ixx-1234-%s.h5",
            settings.file_template_for("/dls/i18/data/2026/cm-1234/ixx-1234")
        );
    }

    #[rstest]
    #[case("/dls/i18/data/2026/cm-1", "cm-1-%s.h5")]
    #[case("/tmp/scans/", "scans-%s.h5")]
    #[case("relative", "relative-%s.h5")]
    #[case("/", "-%s.h5")]
    fn default_template_uses_last_directory_component(#[case] file_dir: &str, #[case] expected: &str) {
        assert_eq!(expected, DeviceSettings::default().file_template_for(file_dir));
    }

    #[test]
    fn explicit_template_wins() {
        let settings = DeviceSettings::builder().file_template("scan-%s.nxs").build();
        assert_eq!("scan-%s.nxs", settings.file_template_for("/tmp/det"));
    }
}
