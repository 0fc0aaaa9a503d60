use std::io;

use anyhow::Result;
use serde::Serialize;
use tracing::instrument;

use crate::cli::OutputFormat;
use crate::device::{DeviceState, MalcolmDevice, MalcolmVersion};
use crate::protocol::Table;

use super::ui::{InspectReportView, Painter};

/// Snapshot of everything `inspect` reads from a device.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InspectReport {
    device: String,
    state: DeviceState,
    health: String,
    busy: bool,
    alive: bool,
    version: MalcolmVersion,
    current_protocol: bool,
    simultaneous_axes: Vec<String>,
    datasets: Table,
}

impl InspectReport {
    /// Reads every reported attribute from `device`.
    pub(crate) async fn read(device: &MalcolmDevice) -> Result<Self> {
        let state = device.get_device_state().await?;
        let health = device.get_device_health().await?;
        let busy = device.is_device_busy().await?;
        let current_protocol = device.is_new_malcolm_version().await?;
        let simultaneous_axes = if current_protocol {
            device.get_available_axes().await?
        } else {
            Vec::new()
        };

        Ok(Self {
            device: device.name().to_string(),
            state,
            health,
            busy,
            alive: device.is_alive(),
            version: device.get_version().await?,
            current_protocol,
            simultaneous_axes,
            datasets: device.get_datasets().await?,
        })
    }

    pub(crate) fn device(&self) -> &str {
        &self.device
    }

    pub(crate) fn state(&self) -> DeviceState {
        self.state
    }

    pub(crate) fn health(&self) -> &str {
        &self.health
    }

    pub(crate) fn busy(&self) -> bool {
        self.busy
    }

    pub(crate) fn alive(&self) -> bool {
        self.alive
    }

    pub(crate) fn version(&self) -> MalcolmVersion {
        self.version
    }

    pub(crate) fn current_protocol(&self) -> bool {
        self.current_protocol
    }

    pub(crate) fn simultaneous_axes(&self) -> &[String] {
        &self.simultaneous_axes
    }

    pub(crate) fn datasets(&self) -> &Table {
        &self.datasets
    }
}

/// Executes the `inspect` command.
#[instrument(skip(device, out), level = "info", fields(?output_format))]
pub(crate) async fn run<W>(
    device: &MalcolmDevice,
    out: &mut W,
    use_colour: bool,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let report = InspectReport::read(device).await?;

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(use_colour);
            writeln!(out, "{}", InspectReportView::new(&report, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
    }

    Ok(())
}
