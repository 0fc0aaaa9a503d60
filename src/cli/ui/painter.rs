use owo_colors::{OwoColorize, Style as OwoStyle};

use crate::device::DeviceState;

/// Applies colour and style to terminal text.
#[derive(Debug)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn heading<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().cyan())
    }

    pub(crate) fn success<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().green())
    }

    pub(crate) fn muted<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().dimmed())
    }

    pub(crate) fn value<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold())
    }

    /// Colours a device state by lifecycle class.
    pub(crate) fn state(&self, state: DeviceState) -> String {
        let style = match state {
            DeviceState::Fault | DeviceState::Aborted | DeviceState::Offline => {
                OwoStyle::new().bold().red()
            }
            DeviceState::Paused | DeviceState::Disabled => OwoStyle::new().bold().yellow(),
            state if state.is_running_state() => OwoStyle::new().bold().cyan(),
            _ => OwoStyle::new().bold().green(),
        };
        self.paint(&state.to_string(), style)
    }

    /// Renders `true`/`false` as `yes`/`no`.
    pub(crate) fn flag(&self, value: bool) -> String {
        if value {
            self.success("yes")
        } else {
            self.muted("no")
        }
    }

    fn paint(&self, text: &str, style: OwoStyle) -> String {
        if self.use_colour {
            format!("{}", text.style(style))
        } else {
            text.to_string()
        }
    }
}
