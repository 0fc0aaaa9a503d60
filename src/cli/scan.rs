use std::io;

use anyhow::Result;
use clap::Args;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{instrument, warn};

use crate::cli::OutputFormat;
use crate::connection::AxisList;
use crate::device::{MalcolmDevice, MalcolmModel, PointGenerator};
use crate::scan::ScanProgress;
use crate::utils::format_names;

use super::ui::{Painter, ProgressView};

/// Arguments for the `scan` command.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Comma-separated axes the scan moves; defaults to the device's simultaneous axes.
    #[arg(long)]
    axes: Option<AxisList>,
    /// Number of points in the scan.
    #[arg(long, default_value_t = 10)]
    points: u64,
    /// Exposure time per point in seconds.
    #[arg(long)]
    exposure: Option<f64>,
    /// Directory the device writes its files into.
    #[arg(long, default_value = "/tmp")]
    file_dir: String,
}

impl ScanArgs {
    /// Creates scan arguments for `points` points into `file_dir`.
    ///
    /// ```
    /// use malcolm::{Args, Command, ScanArgs};
    ///
    /// let scan = ScanArgs::new(5, "/dls/i18/data/2026").with_exposure(0.1);
    /// let (command, _fake) = Args::new(Command::Scan(scan)).into_command_and_fake_args();
    /// assert!(matches!(command, Command::Scan(_)));
    /// ```
    #[must_use]
    pub fn new(points: u64, file_dir: impl Into<String>) -> Self {
        Self {
            axes: None,
            points,
            exposure: None,
            file_dir: file_dir.into(),
        }
    }

    #[must_use]
    pub fn with_exposure(mut self, exposure: f64) -> Self {
        self.exposure = Some(exposure);
        self
    }

    #[must_use]
    pub fn with_axes(mut self, axes: AxisList) -> Self {
        self.axes = Some(axes);
        self
    }
}

/// Executes the `scan` command: validate, configure, then run while
/// streaming published progress records.
#[instrument(skip(device, receiver, out), level = "info", fields(points = args.points))]
pub(crate) async fn run<W>(
    device: &MalcolmDevice,
    mut receiver: broadcast::Receiver<ScanProgress>,
    args: &ScanArgs,
    out: &mut W,
    use_colour: bool,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let painter = Painter::new(use_colour);
    let axes = match &args.axes {
        Some(axes) => axes.clone().into(),
        None => device.get_available_axes().await?,
    };
    device.set_point_generator(
        PointGenerator::builder()
            .axes(axes)
            .duration(args.exposure.unwrap_or_default())
            .size(args.points)
            .build(),
    );
    device.set_file_dir(args.file_dir.clone());

    let model = MalcolmModel::builder()
        .name(device.name())
        .maybe_exposure_time(args.exposure)
        .build();
    let accepted = device.validate_with_return(&model).await?;
    if output_format == OutputFormat::Pretty {
        writeln!(
            out,
            "{} {} points over {} into {}",
            painter.success("Validated"),
            accepted.generator().size(),
            painter.value(format_names(accepted.axes_to_move())),
            painter.value(accepted.file_dir()),
        )?;
    }
    device.configure(&model).await?;

    let scan = device.run(None);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(scan, interrupted);
    let mut aborting = false;
    loop {
        tokio::select! {
            result = &mut scan => {
                result?;
                break;
            }
            signal = &mut interrupted, if !aborting => {
                signal?;
                warn!("interrupted, aborting scan");
                aborting = true;
                device.abort().await?;
            }
            received = receiver.recv() => match received {
                Ok(progress) => write_progress(out, &progress, &painter, output_format)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "progress output fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    loop {
        match receiver.try_recv() {
            Ok(progress) => write_progress(out, &progress, &painter, output_format)?,
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "progress output fell behind"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    Ok(())
}

fn write_progress(
    out: &mut impl io::Write,
    progress: &ScanProgress,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()> {
    match output_format {
        OutputFormat::Pretty => writeln!(out, "{}", ProgressView::new(progress, painter))?,
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, progress)?;
            writeln!(out)?;
        }
    }
    Ok(())
}
