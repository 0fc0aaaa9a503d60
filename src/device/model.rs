use std::collections::BTreeMap;

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scan path handed to the device: participating axes, dwell time and size.
///
/// Individual sub-generator descriptions are opaque to this crate and are
/// forwarded to the device untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct PointGenerator {
    axes: Vec<String>,
    /// Dwell time per point in seconds.
    #[builder(default)]
    duration: f64,
    size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    generators: Vec<Value>,
}

impl PointGenerator {
    #[must_use]
    pub fn axes(&self) -> &[String] {
        &self.axes
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration;
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn generators(&self) -> &[Value] {
        &self.generators
    }
}

/// Scan-framework model describing how a Malcolm device should take part in a scan.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct MalcolmModel {
    #[builder(into)]
    name: String,
    /// Exposure time in seconds; copied into the generator's duration.
    exposure_time: Option<f64>,
    /// Explicit axes to move; otherwise derived from the generator.
    axes_to_move: Option<Vec<String>>,
}

impl MalcolmModel {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn exposure_time(&self) -> Option<f64> {
        self.exposure_time
    }

    #[must_use]
    pub fn axes_to_move(&self) -> Option<&[String]> {
        self.axes_to_move.as_deref()
    }
}

/// Payload of the remote CONFIGURE and VALIDATE calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureParameters {
    file_dir: String,
    file_template: String,
    axes_to_move: Vec<String>,
    generator: PointGenerator,
}

impl ConfigureParameters {
    /// Packages the call payload from the model and the device's simultaneous axes.
    pub(crate) fn package(
        model: &MalcolmModel,
        mut generator: PointGenerator,
        file_dir: String,
        file_template: String,
        simultaneous_axes: &[String],
    ) -> Self {
        if let Some(exposure_time) = model.exposure_time() {
            generator.set_duration(exposure_time);
        }

        let axes_to_move = match model.axes_to_move() {
            Some(axes) => axes.to_vec(),
            None => generator
                .axes()
                .iter()
                .filter(|axis| simultaneous_axes.contains(*axis))
                .cloned()
                .collect(),
        };

        Self {
            file_dir,
            file_template,
            axes_to_move,
            generator,
        }
    }

    #[must_use]
    pub fn file_dir(&self) -> &str {
        &self.file_dir
    }

    #[must_use]
    pub fn file_template(&self) -> &str {
        &self.file_template
    }

    #[must_use]
    pub fn axes_to_move(&self) -> &[String] {
        &self.axes_to_move
    }

    #[must_use]
    pub fn generator(&self) -> &PointGenerator {
        &self.generator
    }
}

/// Starting position for a run: the step index plus named axis positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    step: u64,
    values: BTreeMap<String, f64>,
}

impl Position {
    #[must_use]
    pub fn new(step: u64) -> Self {
        Self {
            step,
            values: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_axis(mut self, axis: impl Into<String>, value: f64) -> Self {
        self.values.insert(axis.into(), value);
        self
    }

    #[must_use]
    pub fn step(&self) -> u64 {
        self.step
    }

    #[must_use]
    pub fn value(&self, axis: &str) -> Option<f64> {
        self.values.get(axis).copied()
    }
}
