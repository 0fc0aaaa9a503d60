use serde_with::{DeserializeFromStr, SerializeDisplay};
use strum_macros::{Display, EnumIter, EnumString};

use super::attribute::AttributeKind;

/// Attribute endpoints exposed by a Malcolm device.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display, EnumString)]
pub enum EndpointId {
    /// Current lifecycle state.
    #[strum(to_string = "state")]
    State,
    /// Free-text health summary.
    #[strum(to_string = "health")]
    Health,
    /// Number of scan points completed so far.
    #[strum(to_string = "completedSteps")]
    CompletedSteps,
    /// Whether the device is executing a method.
    #[strum(to_string = "busy")]
    Busy,
    /// Axes the device can move concurrently.
    #[strum(to_string = "simultaneousAxes")]
    SimultaneousAxes,
    /// Datasets the device will write.
    #[strum(to_string = "datasets")]
    Datasets,
    /// Software version reported by the device.
    #[strum(to_string = "version")]
    Version,
}

/// Descriptive metadata for one endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    label: &'static str,
    kind: AttributeKind,
}

impl EndpointMetadata {
    /// Human-readable endpoint label.
    pub(crate) fn label(self) -> &'static str {
        self.label
    }

    /// Expected value kind.
    pub(crate) fn kind(self) -> AttributeKind {
        self.kind
    }
}

/// Returns metadata for one endpoint.
pub(crate) const fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::State => EndpointMetadata {
            label: "device state",
            kind: AttributeKind::Choice,
        },
        EndpointId::Health => EndpointMetadata {
            label: "device health",
            kind: AttributeKind::String,
        },
        EndpointId::CompletedSteps => EndpointMetadata {
            label: "completed steps",
            kind: AttributeKind::Number,
        },
        EndpointId::Busy => EndpointMetadata {
            label: "busy flag",
            kind: AttributeKind::Boolean,
        },
        EndpointId::SimultaneousAxes => EndpointMetadata {
            label: "simultaneous axes",
            kind: AttributeKind::StringArray,
        },
        EndpointId::Datasets => EndpointMetadata {
            label: "datasets",
            kind: AttributeKind::Table,
        },
        EndpointId::Version => EndpointMetadata {
            label: "software version",
            kind: AttributeKind::String,
        },
    }
}

/// Methods callable on a Malcolm device.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    EnumIter,
    Display,
    EnumString,
    SerializeDisplay,
    DeserializeFromStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum CallMethod {
    Run,
    Configure,
    Validate,
    Pause,
    Resume,
    Abort,
    Reset,
    Disable,
}
