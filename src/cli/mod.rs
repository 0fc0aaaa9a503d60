pub(crate) mod command;
pub(crate) mod control;
pub(crate) mod inspect;
pub(crate) mod scan;
pub(crate) mod ui;

pub use self::command::{Args, Command, FakeArgs, LogLevel, OutputFormat};
pub use self::control::{ControlAction, ControlArgs};
pub use self::scan::ScanArgs;
