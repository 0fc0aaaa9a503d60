use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::cli::control::ControlArgs;
use crate::cli::scan::ScanArgs;
use crate::connection::{AxisList, FakeDeviceConfig, StateFixture};
use crate::device::{DEFAULT_PROGRESS_THROTTLE, DeviceSettings};
use crate::error::FixtureError;

const DEFAULT_DEVICE_NAME: &str = "BL45P-ML-SCAN-01";

/// Command-line options for the Malcolm device client.
#[derive(Debug, Parser)]
#[command(
    name = "malcolm",
    about = "Drive a Malcolm scan device through its control protocol."
)]
pub struct Args {
    /// Name of the Malcolm block to control.
    #[arg(long, global = true, default_value = DEFAULT_DEVICE_NAME)]
    device: String,
    /// Log verbosity; overrides `RUST_LOG`.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to pretty on a terminal and JSON otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// Minimum spacing between progress records (e.g. `250ms`, `1s`).
    #[arg(long, global = true, value_parser = parse_duration)]
    throttle: Option<Duration>,
    /// Delay before re-reading device state after a reconnect.
    #[arg(long, global = true, value_parser = parse_duration)]
    reconnect_delay: Option<Duration>,
    /// Output file template; `%s` is replaced by the dataset name.
    #[arg(long, global = true)]
    file_template: Option<String>,
    /// Initial state of the simulated device.
    #[arg(long, global = true)]
    fake_state: Option<StateFixture>,
    /// Health text reported by the simulated device.
    #[arg(long, global = true)]
    fake_health: Option<String>,
    /// Comma-separated simultaneous axes of the simulated device.
    #[arg(long, global = true)]
    fake_axes: Option<AxisList>,
    /// Version string reported by the simulated device.
    #[arg(long, global = true)]
    fake_version: Option<String>,
    /// Pause between simulated scan points (e.g. `20ms`).
    #[arg(long, global = true, value_parser = parse_duration)]
    fake_step_delay: Option<Duration>,
    /// Make the simulated device reject `simultaneousAxes` reads like a pre-4.x server.
    #[arg(long, global = true)]
    fake_legacy: bool,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use malcolm::{Args, Command};
    ///
    /// let args = Args::new(Command::Inspect).with_device("BL45P-ML-DET-01");
    /// assert_eq!("BL45P-ML-DET-01", args.device());
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            device: DEFAULT_DEVICE_NAME.to_string(),
            log_level: None,
            output: None,
            throttle: None,
            reconnect_delay: None,
            file_template: None,
            fake_state: None,
            fake_health: None,
            fake_axes: None,
            fake_version: None,
            fake_step_delay: None,
            fake_legacy: false,
            command,
        }
    }

    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Replaces the simulated-device settings with pre-parsed ones.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            state,
            health,
            axes,
            version,
            step_delay,
            legacy_protocol,
        } = fake;

        self.fake_state = state;
        self.fake_health = health;
        self.fake_axes = axes;
        self.fake_version = version;
        self.fake_step_delay = Some(step_delay);
        self.fake_legacy = legacy_protocol;
        self
    }

    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the explicit log-level override, if any.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the explicit output format, if any.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Controller settings assembled from the tuning flags.
    #[must_use]
    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings::builder()
            .progress_throttle(self.throttle.unwrap_or(DEFAULT_PROGRESS_THROTTLE))
            .reconnect_fetch_delay(self.reconnect_delay.unwrap_or(Duration::ZERO))
            .maybe_file_template(self.file_template.clone())
            .build()
    }

    /// Splits parsed CLI arguments into the command and simulated-device settings.
    #[must_use]
    pub fn into_command_and_fake_args(self) -> (Command, FakeArgs) {
        let Args {
            fake_state,
            fake_health,
            fake_axes,
            fake_version,
            fake_step_delay,
            fake_legacy,
            command,
            ..
        } = self;

        let fake_args = FakeArgs {
            state: fake_state,
            health: fake_health,
            axes: fake_axes,
            version: fake_version,
            step_delay: fake_step_delay.unwrap_or(Duration::ZERO),
            legacy_protocol: fake_legacy,
        };
        (command, fake_args)
    }
}

/// Simulated-device arguments for programmatic runs.
#[derive(Debug, Default, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    state: Option<StateFixture>,
    #[builder(into)]
    health: Option<String>,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    axes: Option<AxisList>,
    #[builder(into)]
    version: Option<String>,
    #[builder(default)]
    step_delay: Duration,
    #[builder(default)]
    legacy_protocol: bool,
}

impl FakeArgs {
    pub(crate) fn into_device_config(self) -> FakeDeviceConfig {
        let Self {
            state,
            health,
            axes,
            version,
            step_delay,
            legacy_protocol,
        } = self;

        FakeDeviceConfig::builder()
            .maybe_state(state.map(Into::into))
            .maybe_health(health)
            .maybe_axes(axes.map(Into::into))
            .maybe_version(version)
            .step_delay(step_delay)
            .legacy_protocol(legacy_protocol)
            .build()
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the device state, health, version, axes and datasets.
    Inspect,
    /// Send one lifecycle command and report the resulting state.
    Control(ControlArgs),
    /// Validate, configure and run a scan, printing every progress record.
    Scan(ScanArgs),
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Inspect => "inspect",
            Self::Control(_args) => "control",
            Self::Scan(_args) => "scan",
        }
    }
}

/// Rendering used for command output.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables and lines.
    Pretty,
    /// JSON documents.
    Json,
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn throttle_flag_uses_humantime() {
        let args = Args::try_parse_from(["malcolm", "--throttle", "1s", "inspect"])
            .expect("valid arguments should parse");

        assert_eq!(
            Duration::from_secs(1),
            args.device_settings().progress_throttle()
        );
    }

    #[test]
    fn defaults_apply_without_tuning_flags() {
        let args =
            Args::try_parse_from(["malcolm", "inspect"]).expect("valid arguments should parse");

        let settings = args.device_settings();
        assert_eq!(DEFAULT_PROGRESS_THROTTLE, settings.progress_throttle());
        assert_eq!("tmp-%s.h5", settings.file_template_for("/tmp"));
    }

    #[test]
    fn unknown_fake_state_is_rejected() {
        let result = Args::try_parse_from(["malcolm", "--fake-state", "Sleeping", "inspect"]);

        let error = result.expect_err("unknown state should fail argument parsing");
        assert_eq!(ErrorKind::ValueValidation, error.kind());
    }

    #[test]
    fn fake_flags_build_device_config() {
        let args = Args::try_parse_from([
            "malcolm",
            "--fake-state",
            "armed",
            "--fake-axes",
            "stage_x",
            "inspect",
        ])
        .expect("valid fake arguments should parse");

        let (command, fake_args) = args.into_command_and_fake_args();
        assert_matches!(command, Command::Inspect);
        assert_matches!(fake_args.state, Some(_));
        assert_matches!(fake_args.axes, Some(_));
    }
}
