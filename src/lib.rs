//! Client for Malcolm scan devices.
//!
//! [`MalcolmDevice`] drives one remote device over a [`Connection`]: lifecycle
//! commands, configuration and validation, attribute queries, and translation
//! of pushed state and progress updates into [`ScanProgress`] records handed
//! to a [`ScanProgressPublisher`].

mod app;
mod cli;
mod connection;
mod device;
mod error;
mod protocol;
mod scan;
mod telemetry;
mod terminal;
mod utils;

pub use app::{RunOptions, fake_connection, run, run_with_clients};
pub use cli::{
    Args, Command, ControlAction, ControlArgs, FakeArgs, LogLevel, OutputFormat, ScanArgs,
};
pub use connection::{
    AxisList, Connection, ConnectionError, ConnectionStateListener, FakeConnection,
    FakeDeviceConfig, MessageListener, SentMessage, StateFixture,
};
pub use device::{
    ConfigureParameters, DEFAULT_PROGRESS_THROTTLE, DeviceSettings, DeviceState, MalcolmDevice,
    MalcolmModel, MalcolmVersion, PointGenerator, Position, VersionParseError,
};
pub use error::{FixtureError, MALCOLM_ERROR_PREFIX, MalcolmError, ValidationError};
pub use protocol::{
    Attribute, AttributeError, AttributeKind, AttributeValue, CallMethod, EndpointId, Message,
    MessageGenerator, MessageType, Table,
};
pub use scan::{
    BroadcastPublisher, ScanProgress, ScanProgressPublisher, ScanProgressUpdate, ScanStatus,
};
pub use terminal::{SystemTerminalClient, TerminalClient};
