//! Client-side control of one Malcolm device.

mod controller;
mod listeners;
mod model;
mod settings;
mod state;
mod throttle;
mod version;

pub use self::controller::MalcolmDevice;
pub use self::model::{ConfigureParameters, MalcolmModel, PointGenerator, Position};
pub use self::settings::{DEFAULT_PROGRESS_THROTTLE, DeviceSettings};
pub use self::state::DeviceState;
pub use self::version::{MalcolmVersion, VersionParseError};
