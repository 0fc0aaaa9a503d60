use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, trace, warn};

use super::DeviceState;
use super::controller::DeviceCore;
use super::throttle::Throttle;
use crate::connection::{ConnectionStateListener, MessageListener};
use crate::error::MalcolmError;
use crate::protocol::{AttributeValue, EndpointId, Message, MessageType};
use crate::scan::ScanProgressUpdate;

/// Republishes every `state` UPDATE as a transition from the cached state,
/// unthrottled.
pub(crate) struct StateChangeListener {
    core: Arc<DeviceCore>,
}

impl StateChangeListener {
    pub(crate) fn new(core: Arc<DeviceCore>) -> Self {
        Self { core }
    }

    fn handle(&self, message: &Message) -> Result<(), MalcolmError> {
        if message.message_type() != MessageType::Update {
            trace!(message_type = %message.message_type(), "ignoring non-update on state");
            return Ok(());
        }

        let attribute = self.core.attribute_from_reply(message, EndpointId::State)?;
        let state = self.core.parse_state(&attribute)?;
        let previous = self.core.record_transition(state);
        debug!(?previous, %state, "device state changed");

        self.core
            .publish(ScanProgressUpdate::transition(previous, state));
        Ok(())
    }
}

#[async_trait]
impl MessageListener for StateChangeListener {
    #[instrument(skip_all, level = "debug", fields(device = self.core.name(), id = message.id()))]
    async fn event_performed(&self, message: Message) {
        if let Err(error) = self.handle(&message) {
            warn!(%error, "dropping state update");
        }
    }
}

/// Republishes `completedSteps` UPDATEs at most once per throttle interval.
/// Updates arriving while the device sits in a final state bypass the throttle.
pub(crate) struct ProgressChangeListener {
    core: Arc<DeviceCore>,
    throttle: Throttle,
}

impl ProgressChangeListener {
    pub(crate) fn new(core: Arc<DeviceCore>, interval: Duration) -> Self {
        Self {
            core,
            throttle: Throttle::new(interval),
        }
    }

    fn handle(&self, message: &Message) -> Result<(), MalcolmError> {
        if message.message_type() != MessageType::Update {
            trace!(message_type = %message.message_type(), "ignoring non-update on completedSteps");
            return Ok(());
        }

        let attribute = self
            .core
            .attribute_from_reply(message, EndpointId::CompletedSteps)?;
        let AttributeValue::Number(raw_steps) = attribute.value() else {
            return Ok(());
        };
        let completed_steps = raw_steps.max(0.0).round() as u64;

        let settled = self
            .core
            .cached_state()
            .is_some_and(DeviceState::is_final_state);
        if !settled && !self.throttle.try_pass() {
            trace!(completed_steps, "progress update throttled");
            return Ok(());
        }

        self.core.publish_with(|progress| {
            let size = progress.size();
            let percent = if size == 0 {
                0.0
            } else {
                100.0 * completed_steps as f64 / size as f64
            };
            ScanProgressUpdate {
                point: Some(completed_steps),
                percent_complete: Some(percent),
                message: Some(format!("Point {completed_steps} of {size}")),
                ..ScanProgressUpdate::default()
            }
        });
        Ok(())
    }
}

#[async_trait]
impl MessageListener for ProgressChangeListener {
    #[instrument(skip_all, level = "trace", fields(device = self.core.name(), id = message.id()))]
    async fn event_performed(&self, message: Message) {
        if let Err(error) = self.handle(&message) {
            warn!(%error, "dropping progress update");
        }
    }
}

/// Tracks connectivity: marks the device offline on loss and re-reads its
/// state in the background once the connection returns.
pub(crate) struct ConnectionChangeListener {
    core: Arc<DeviceCore>,
}

impl ConnectionChangeListener {
    pub(crate) fn new(core: Arc<DeviceCore>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl ConnectionStateListener for ConnectionChangeListener {
    #[instrument(skip(self), level = "info", fields(device = self.core.name()))]
    async fn connection_changed(&self, connected: bool) {
        if !connected {
            self.core.mark_disconnected();
            return;
        }

        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            if let Err(error) = core.mark_reconnected().await {
                warn!(%error, device = core.name(), "failed to refresh state after reconnect");
            }
        });
    }
}
