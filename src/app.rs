use std::io;
use std::sync::Arc;

use anyhow::Result;
use bon::Builder;
use tracing::{instrument, warn};

use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat};
use crate::connection::{Connection, FakeConnection};
use crate::device::{DeviceSettings, MalcolmDevice};
use crate::scan::BroadcastPublisher;
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a connection to an in-process simulated Malcolm device.
#[must_use]
pub fn fake_connection(fake_args: FakeArgs) -> Arc<dyn Connection> {
    Arc::new(FakeConnection::new(fake_args.into_device_config()))
}

/// Per-run options resolved from the command line.
#[derive(Debug, Builder)]
pub struct RunOptions {
    #[builder(into)]
    device_name: String,
    #[builder(default)]
    settings: DeviceSettings,
    output_format: Option<OutputFormat>,
    log_level: Option<LogLevel>,
}

/// Runs the CLI command against `connection`.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = malcolm::Args::try_parse_from([
///     "malcolm",
///     "--output",
///     "json",
///     "--fake-version",
///     "4.2.1",
///     "inspect",
/// ])?;
/// let options = malcolm::RunOptions::builder()
///     .device_name(args.device())
///     .settings(args.device_settings())
///     .maybe_output_format(args.output_format())
///     .build();
/// let (command, fake_args) = args.into_command_and_fake_args();
/// let mut out = Vec::new();
/// malcolm::run(command, &mut out, malcolm::fake_connection(fake_args), options).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, a device operation
/// fails, or output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    connection: Arc<dyn Connection>,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients(command, out, &SystemTerminalClient, connection, options).await
}

/// Runs the CLI command with injected clients.
///
/// The device is initialised before the command runs and disposed after it,
/// whether or not the command succeeded.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, a device operation
/// fails, or output writing fails.
#[instrument(
    skip(out, terminal_client, connection, options),
    level = "info",
    fields(command = command.name(), device = %options.device_name)
)]
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    connection: Arc<dyn Connection>,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    let RunOptions {
        device_name,
        settings,
        output_format,
        log_level,
    } = options;

    telemetry::initialise_tracing(
        "malcolm",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    let use_colour = terminal_client.stdout_is_terminal();
    let output_format = output_format.unwrap_or(if use_colour {
        OutputFormat::Pretty
    } else {
        OutputFormat::Json
    });

    let publisher = Arc::new(BroadcastPublisher::new());
    let device = MalcolmDevice::builder()
        .name(device_name.as_str())
        .connection(connection)
        .publisher(Arc::clone(&publisher) as _)
        .settings(settings)
        .build();

    crate::cli::ui::Spinner::new(terminal_client.stderr_is_terminal())
        .wrap(format!("Connecting to {device_name}"), device.initialize())
        .await?;

    let result = match command {
        Command::Inspect => {
            crate::cli::inspect::run(&device, out, use_colour, output_format).await
        }
        Command::Control(args) => {
            crate::cli::control::run(&device, &args, out, use_colour, output_format).await
        }
        Command::Scan(args) => {
            crate::cli::scan::run(
                &device,
                publisher.subscribe(),
                &args,
                out,
                use_colour,
                output_format,
            )
            .await
        }
    };

    if let Err(error) = device.dispose().await {
        warn!(%error, "failed to dispose device cleanly");
    }
    result
}
