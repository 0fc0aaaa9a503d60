use std::fmt::{self, Display, Formatter};

use crate::cli::inspect::InspectReport;
use crate::utils::format_names;

use super::painter::Painter;
use super::table::Table;

/// Renders an inspect report as a device table followed by its datasets.
pub(crate) struct InspectReportView<'a> {
    report: &'a InspectReport,
    painter: &'a Painter,
}

impl<'a> InspectReportView<'a> {
    pub(crate) fn new(report: &'a InspectReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }
}

impl Display for InspectReportView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let report = self.report;
        let painter = self.painter;
        let protocol = if report.current_protocol() {
            painter.value("current")
        } else {
            painter.muted("legacy")
        };

        let device_table = Table::key_value(
            painter,
            vec![
                ("state", painter.state(report.state())),
                ("health", painter.value(report.health())),
                ("busy", painter.flag(report.busy())),
                ("alive", painter.flag(report.alive())),
                ("version", painter.value(report.version().to_string())),
                ("protocol", protocol),
                (
                    "simultaneous_axes",
                    painter.value(format_names(report.simultaneous_axes())),
                ),
            ],
        );

        write!(f, "{}", painter.heading(format!("Device {}:", report.device())))?;
        write!(f, "\n{device_table}")?;
        writeln!(f)?;
        write!(f, "\n{}", painter.heading("Datasets:"))?;
        if report.datasets().row_count() == 0 {
            write!(f, "\n{}", painter.muted("<none>"))
        } else {
            write!(f, "\n{}", Table::from_attribute(report.datasets()))
        }
    }
}
