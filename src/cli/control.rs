use std::io;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use tracing::instrument;

use crate::cli::OutputFormat;
use crate::device::{DeviceState, MalcolmDevice};

use super::ui::Painter;

/// JSON result emitted by a `control` action.
#[derive(Debug, Serialize)]
struct ControlResult {
    device: String,
    action: String,
    state: DeviceState,
}

/// Arguments for the `control` command.
#[derive(Debug, Args)]
pub struct ControlArgs {
    #[command(subcommand)]
    action: ControlAction,
}

impl ControlArgs {
    /// Creates control arguments for one action.
    ///
    /// ```
    /// use malcolm::{Args, Command, ControlAction, ControlArgs};
    ///
    /// let control = ControlArgs::new(ControlAction::Seek { step: 31 });
    /// let (command, _fake) = Args::new(Command::Control(control)).into_command_and_fake_args();
    /// assert!(matches!(command, Command::Control(_)));
    /// ```
    #[must_use]
    pub fn new(action: ControlAction) -> Self {
        Self { action }
    }
}

/// Lifecycle command sent by `control`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Subcommand)]
pub enum ControlAction {
    /// Start or continue an armed scan.
    Run,
    /// Pause a running scan.
    Pause,
    /// Resume a paused scan.
    Resume,
    /// Abort whatever the device is doing.
    Abort,
    /// Return the device to Ready.
    Reset,
    /// Disable the device.
    Disable,
    /// Move a paused or armed scan to a given step.
    Seek {
        /// Completed-steps count to reposition to.
        step: u64,
    },
}

impl ControlAction {
    fn label(self) -> String {
        match self {
            Self::Run => "run".to_string(),
            Self::Pause => "pause".to_string(),
            Self::Resume => "resume".to_string(),
            Self::Abort => "abort".to_string(),
            Self::Reset => "reset".to_string(),
            Self::Disable => "disable".to_string(),
            Self::Seek { step } => format!("seek {step}"),
        }
    }
}

/// Executes the `control` command.
#[instrument(skip(device, out), level = "info", fields(action = ?args.action))]
pub(crate) async fn run<W>(
    device: &MalcolmDevice,
    args: &ControlArgs,
    out: &mut W,
    use_colour: bool,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let action = args.action;
    match action {
        ControlAction::Run => device.run(None).await?,
        ControlAction::Pause => device.pause().await?,
        ControlAction::Resume => device.resume().await?,
        ControlAction::Abort => device.abort().await?,
        ControlAction::Reset => device.reset().await?,
        ControlAction::Disable => device.disable().await?,
        ControlAction::Seek { step } => device.seek(step).await?,
    }
    let state = device.get_device_state().await?;

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(use_colour);
            writeln!(
                out,
                "{} {}: {} is now {}",
                painter.success("Applied"),
                action.label(),
                device.name(),
                painter.value(state.to_string()),
            )?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(
                &mut *out,
                &ControlResult {
                    device: device.name().to_string(),
                    action: action.label(),
                    state,
                },
            )?;
            writeln!(out)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ControlAction::Abort, "abort")]
    #[case(ControlAction::Seek { step: 31 }, "seek 31")]
    fn labels_name_the_action(#[case] action: ControlAction, #[case] expected: &str) {
        assert_eq!(expected, action.label());
    }
}
