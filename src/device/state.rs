use serde_with::{DeserializeFromStr, SerializeDisplay};
use strum_macros::{Display, EnumIter, EnumString};

/// Lifecycle state reported by a Malcolm device.
///
/// The remote device does not enforce a strict automaton, so these states are
/// only classified here for local decisions such as the busy check.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    SerializeDisplay,
    DeserializeFromStr,
)]
#[strum(ascii_case_insensitive)]
pub enum DeviceState {
    Resetting,
    Ready,
    Idle,
    Configuring,
    Armed,
    Running,
    PostRun,
    Seeking,
    Paused,
    Aborting,
    Aborted,
    Fault,
    Disabling,
    Disabled,
    Finished,
    Offline,
}

impl DeviceState {
    /// Whether the device is idle and available for a new command.
    #[must_use]
    pub fn is_rest_state(self) -> bool {
        matches!(
            self,
            Self::Ready
                | Self::Idle
                | Self::Armed
                | Self::Aborted
                | Self::Fault
                | Self::Disabled
                | Self::Finished
                | Self::Offline
        )
    }

    /// Whether the device is actively executing a method.
    #[must_use]
    pub fn is_running_state(self) -> bool {
        matches!(
            self,
            Self::Resetting
                | Self::Configuring
                | Self::Running
                | Self::PostRun
                | Self::Seeking
                | Self::Aborting
                | Self::Disabling
        )
    }

    /// Whether a run has ended in this state.
    #[must_use]
    pub fn is_final_state(self) -> bool {
        matches!(
            self,
            Self::Aborted | Self::Fault | Self::Finished | Self::Disabled
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;

    #[rstest]
    #[case("Ready", DeviceState::Ready)]
    #[case("READY", DeviceState::Ready)]
    #[case("PostRun", DeviceState::PostRun)]
    #[case("postrun", DeviceState::PostRun)]
    #[case("Seeking", DeviceState::Seeking)]
    fn parses_remote_choice_text(#[case] text: &str, #[case] expected: DeviceState) {
        assert_eq!(Ok(expected), text.parse::<DeviceState>());
    }

    #[test]
    fn rejects_unknown_state() {
        assert!("Exploding".parse::<DeviceState>().is_err());
    }

    #[test]
    fn paused_is_neither_rest_nor_running() {
        assert!(!DeviceState::Paused.is_rest_state());
        assert!(!DeviceState::Paused.is_running_state());
    }

    #[test]
    fn running_states_are_never_rest_states() {
        for state in DeviceState::iter() {
            assert!(
                !(state.is_running_state() && state.is_rest_state()),
                "{state} classified as both running and rest"
            );
        }
    }

    #[test]
    fn final_states_are_rest_states() {
        for state in DeviceState::iter().filter(|state| state.is_final_state()) {
            assert!(state.is_rest_state(), "{state} should be a rest state");
        }
    }
}
