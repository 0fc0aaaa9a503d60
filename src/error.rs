use thiserror::Error;

use crate::connection::ConnectionError;
use crate::protocol::{AttributeError, MessageType};

/// Prefix of every device error raised from an ERROR reply.
pub const MALCOLM_ERROR_PREFIX: &str = "Error from Malcolm Device Connection: ";

/// Errors returned by Malcolm device operations.
#[derive(Debug, Error)]
pub enum MalcolmError {
    #[error("{prefix}{message}", prefix = MALCOLM_ERROR_PREFIX)]
    Device { message: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("invalid attribute reply from `{device}`")]
    Attribute {
        device: String,
        #[source]
        source: AttributeError,
    },
    #[error("`{device}` answered a {request} request with {reply} instead of RETURN")]
    UnexpectedReply {
        device: String,
        request: MessageType,
        reply: MessageType,
    },
    #[error("`{device}` answered request {request_id} with reply {reply_id}")]
    Uncorrelated {
        device: String,
        request_id: u64,
        reply_id: u64,
    },
    #[error("`{device}` reported unknown state `{state}`")]
    UnknownState { device: String, state: String },
    #[error("failed to encode or decode the configure payload for `{device}`")]
    Payload {
        device: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{device}` is already initialised")]
    AlreadyInitialised { device: String },
    #[error("no point generator has been set on `{device}`")]
    MissingPointGenerator { device: String },
    #[error("no file directory has been set on `{device}`")]
    MissingFileDir { device: String },
}

/// A VALIDATE call rejected by the device.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("validation failed: {message}")]
pub struct ValidationError {
    message: String,
    field_names: Vec<String>,
}

impl ValidationError {
    #[must_use]
    pub fn new(message: impl Into<String>, field_names: Vec<String>) -> Self {
        Self {
            message: message.into(),
            field_names,
        }
    }

    /// Remote error text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Names of the model fields the device rejected, when reported.
    #[must_use]
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }
}

/// Errors returned when parsing simulated-device fixtures.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FixtureError {
    #[error("`{value}` is not a known device state")]
    UnknownState { value: String },
    #[error("axis list contains an empty name")]
    EmptyAxisName,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
