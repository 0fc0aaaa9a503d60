use serde::Serialize;
use strum_macros::Display;
use time::OffsetDateTime;

use crate::device::DeviceState;

/// Scan-level status derived from the device state.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Ready,
    Preparing,
    Running,
    Paused,
    Aborted,
    Complete,
    Failed,
    Disabled,
    Offline,
}

impl From<DeviceState> for ScanStatus {
    fn from(state: DeviceState) -> Self {
        match state {
            DeviceState::Ready | DeviceState::Idle | DeviceState::Armed => Self::Ready,
            DeviceState::Resetting | DeviceState::Configuring => Self::Preparing,
            DeviceState::Running | DeviceState::PostRun | DeviceState::Seeking => Self::Running,
            DeviceState::Paused => Self::Paused,
            DeviceState::Aborting | DeviceState::Aborted => Self::Aborted,
            DeviceState::Finished => Self::Complete,
            DeviceState::Fault => Self::Failed,
            DeviceState::Disabling | DeviceState::Disabled => Self::Disabled,
            DeviceState::Offline => Self::Offline,
        }
    }
}

/// Mutable aggregate describing the current scan as seen through one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    device_name: String,
    device_state: Option<DeviceState>,
    previous_device_state: Option<DeviceState>,
    status: Option<ScanStatus>,
    previous_status: Option<ScanStatus>,
    point: u64,
    size: u64,
    message: Option<String>,
    percent_complete: f64,
    #[serde(with = "time::serde::rfc3339::option")]
    start_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    last_update: Option<OffsetDateTime>,
}

/// A partial change to a [`ScanProgress`]; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanProgressUpdate {
    pub device_state: Option<DeviceState>,
    pub previous_device_state: Option<Option<DeviceState>>,
    pub point: Option<u64>,
    pub size: Option<u64>,
    pub message: Option<String>,
    pub percent_complete: Option<f64>,
    pub start_time: Option<OffsetDateTime>,
}

impl ScanProgressUpdate {
    /// A transition from `previous` to `current`, with status derived from both.
    #[must_use]
    pub fn transition(previous: Option<DeviceState>, current: DeviceState) -> Self {
        Self {
            device_state: Some(current),
            previous_device_state: Some(previous),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ScanProgress {
    #[must_use]
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            device_state: None,
            previous_device_state: None,
            status: None,
            previous_status: None,
            point: 0,
            size: 0,
            message: None,
            percent_complete: 0.0,
            start_time: None,
            last_update: None,
        }
    }

    /// Applies every present field of `update` and stamps the update time.
    pub fn merge(&mut self, update: ScanProgressUpdate) {
        let ScanProgressUpdate {
            device_state,
            previous_device_state,
            point,
            size,
            message,
            percent_complete,
            start_time,
        } = update;

        if let Some(previous) = previous_device_state {
            self.previous_device_state = previous;
            self.previous_status = previous.map(ScanStatus::from);
        }
        if let Some(state) = device_state {
            self.device_state = Some(state);
            self.status = Some(ScanStatus::from(state));
        }
        if let Some(point) = point {
            self.point = point;
        }
        if let Some(size) = size {
            self.size = size;
        }
        if let Some(message) = message {
            self.message = Some(message);
        }
        if let Some(percent) = percent_complete {
            self.percent_complete = percent;
        }
        if let Some(start_time) = start_time {
            self.start_time = Some(start_time);
        }
        self.last_update = Some(OffsetDateTime::now_utc());
    }

    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    #[must_use]
    pub fn device_state(&self) -> Option<DeviceState> {
        self.device_state
    }

    #[must_use]
    pub fn previous_device_state(&self) -> Option<DeviceState> {
        self.previous_device_state
    }

    #[must_use]
    pub fn status(&self) -> Option<ScanStatus> {
        self.status
    }

    #[must_use]
    pub fn previous_status(&self) -> Option<ScanStatus> {
        self.previous_status
    }

    #[must_use]
    pub fn point(&self) -> u64 {
        self.point
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        self.percent_complete
    }

    #[must_use]
    pub fn start_time(&self) -> Option<OffsetDateTime> {
        self.start_time
    }

    #[must_use]
    pub fn last_update(&self) -> Option<OffsetDateTime> {
        self.last_update
    }
}
