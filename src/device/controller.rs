use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bon::bon;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::{debug, info, instrument, trace, warn};

use super::listeners::{ConnectionChangeListener, ProgressChangeListener, StateChangeListener};
use super::{
    ConfigureParameters, DeviceSettings, DeviceState, MalcolmModel, MalcolmVersion,
    PointGenerator, Position,
};
use crate::connection::{Connection, ConnectionStateListener, MessageListener};
use crate::error::{MalcolmError, ValidationError};
use crate::protocol::{
    Attribute, AttributeError, AttributeValue, CallMethod, EndpointId, Message, MessageGenerator,
    MessageType, Table, endpoint_metadata,
};
use crate::scan::{ScanProgress, ScanProgressPublisher, ScanProgressUpdate};
use crate::utils::lock;

/// State shared between the controller and its subscription listeners.
pub(crate) struct DeviceCore {
    name: String,
    connection: Arc<dyn Connection>,
    messages: MessageGenerator,
    publisher: Arc<dyn ScanProgressPublisher>,
    settings: DeviceSettings,
    cached_state: Mutex<Option<DeviceState>>,
    progress: Mutex<ScanProgress>,
    alive: AtomicBool,
    transitions_published: AtomicBool,
    initialised: AtomicBool,
    watching_connection: AtomicBool,
    subscriptions: Mutex<Option<Subscriptions>>,
}

impl DeviceCore {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Sends `request` and checks the reply is correlated with it.
    async fn exchange(&self, request: Message) -> Result<Message, MalcolmError> {
        let request_id = request.id();
        debug!(
            id = request_id,
            message_type = %request.message_type(),
            endpoint = request.endpoint(),
            "sending request"
        );

        let reply = self.connection.send(&self.name, request).await?;
        debug!(
            id = reply.id(),
            message_type = %reply.message_type(),
            raw_value = reply.raw_value(),
            "received reply"
        );
        if reply.id() != request_id {
            return Err(MalcolmError::Uncorrelated {
                device: self.name.clone(),
                request_id,
                reply_id: reply.id(),
            });
        }
        Ok(reply)
    }

    async fn fetch(&self, endpoint: EndpointId) -> Result<Attribute, MalcolmError> {
        trace!(attribute = endpoint_metadata(endpoint).label(), "reading");
        let reply = self.exchange(self.messages.get(endpoint)).await?;
        self.attribute_from_reply(&reply, endpoint)
    }

    /// Decodes the attribute carried by a GET reply or pushed UPDATE.
    pub(crate) fn attribute_from_reply(
        &self,
        reply: &Message,
        endpoint: EndpointId,
    ) -> Result<Attribute, MalcolmError> {
        match reply.message_type() {
            MessageType::Return | MessageType::Update => reply
                .attribute(endpoint)
                .and_then(|attribute| attribute.expect_kind(endpoint_metadata(endpoint).kind()))
                .map_err(|source| MalcolmError::Attribute {
                    device: self.name.clone(),
                    source,
                }),
            MessageType::Error => Err(self.device_error(reply)),
            other => Err(MalcolmError::UnexpectedReply {
                device: self.name.clone(),
                request: MessageType::Get,
                reply: other,
            }),
        }
    }

    fn device_error(&self, reply: &Message) -> MalcolmError {
        MalcolmError::Device {
            message: reply.error_text().unwrap_or_default().to_string(),
        }
    }

    pub(crate) fn parse_state(&self, attribute: &Attribute) -> Result<DeviceState, MalcolmError> {
        let text = attribute.as_text().unwrap_or_default();
        text.parse().map_err(|_error| MalcolmError::UnknownState {
            device: self.name.clone(),
            state: text.to_string(),
        })
    }

    /// Reads the remote state and refreshes the cache.
    async fn fetch_state(&self) -> Result<DeviceState, MalcolmError> {
        let attribute = self.fetch(EndpointId::State).await?;
        let state = self.parse_state(&attribute)?;
        self.cache_state(state);
        Ok(state)
    }

    /// Replaces the cached state, returning the one it replaced.
    pub(crate) fn cache_state(&self, state: DeviceState) -> Option<DeviceState> {
        lock(&self.cached_state).replace(state)
    }

    pub(crate) fn cached_state(&self) -> Option<DeviceState> {
        *lock(&self.cached_state)
    }

    /// Caches a pushed `state` and returns the state it moved from, which is
    /// absent until the first transition has been published.
    pub(crate) fn record_transition(&self, state: DeviceState) -> Option<DeviceState> {
        let previous = self.cache_state(state);
        if self.transitions_published.swap(true, Ordering::SeqCst) {
            previous
        } else {
            None
        }
    }

    /// Seeds the cached state and subscribes to state and progress.
    async fn establish(self: &Arc<Self>) -> Result<DeviceState, MalcolmError> {
        let state = self.fetch_state().await?;
        debug!(%state, "seeded device state");

        let state_subscription = self
            .subscribe(
                EndpointId::State,
                Arc::new(StateChangeListener::new(Arc::clone(self))),
            )
            .await?;
        let progress_listener = Arc::new(ProgressChangeListener::new(
            Arc::clone(self),
            self.settings.progress_throttle(),
        ));
        let progress_subscription = match self
            .subscribe(EndpointId::CompletedSteps, progress_listener)
            .await
        {
            Ok(subscription) => subscription,
            Err(error) => {
                self.unsubscribe(&state_subscription).await.unwrap_or_else(
                    |teardown_error| warn!(%teardown_error, "failed to drop state subscription"),
                );
                return Err(error);
            }
        };

        *lock(&self.subscriptions) = Some(Subscriptions {
            state: state_subscription,
            progress: progress_subscription,
        });
        self.initialised.store(true, Ordering::SeqCst);
        self.alive.store(true, Ordering::SeqCst);
        Ok(state)
    }

    /// Registers the connection-state listener, at most once per device.
    fn watch_connection(self: &Arc<Self>) {
        if self.watching_connection.swap(true, Ordering::SeqCst) {
            return;
        }

        let core = Arc::clone(self);
        let listener: Arc<dyn ConnectionStateListener> =
            Arc::new(ConnectionChangeListener::new(Arc::clone(self)));
        tokio::spawn(async move {
            if let Err(error) = core
                .connection
                .subscribe_to_connection_state_change(&core.name, listener)
                .await
            {
                warn!(%error, device = %core.name, "failed to watch connection state");
            }
        });
    }

    async fn subscribe(
        &self,
        endpoint: EndpointId,
        listener: Arc<dyn MessageListener>,
    ) -> Result<Subscription, MalcolmError> {
        let message = self.messages.subscribe(endpoint);
        self.connection
            .subscribe(&self.name, message.clone(), Arc::clone(&listener))
            .await?;
        debug!(%endpoint, id = message.id(), "subscribed");
        Ok(Subscription { message, listener })
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> Result<(), MalcolmError> {
        let message = self.messages.unsubscribe(&subscription.message);
        self.connection
            .unsubscribe(&self.name, message, Arc::clone(&subscription.listener))
            .await?;
        Ok(())
    }

    /// Merges `update` into the progress record without broadcasting.
    fn merge_progress(&self, update: ScanProgressUpdate) {
        lock(&self.progress).merge(update);
    }

    pub(crate) fn publish(&self, update: ScanProgressUpdate) {
        self.publish_with(|_progress| update);
    }

    /// Builds an update from the current record, merges it and broadcasts the result.
    pub(crate) fn publish_with(&self, build: impl FnOnce(&ScanProgress) -> ScanProgressUpdate) {
        let snapshot = {
            let mut progress = lock(&self.progress);
            let update = build(&progress);
            progress.merge(update);
            progress.clone()
        };
        self.publisher.broadcast(&snapshot);
    }

    pub(crate) fn mark_disconnected(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let previous = self.cache_state(DeviceState::Offline);
        self.transitions_published.store(true, Ordering::SeqCst);
        info!(device = %self.name, ?previous, "connection lost");
        self.publish(
            ScanProgressUpdate::transition(previous, DeviceState::Offline)
                .with_message(format!("disconnected from {}", self.name)),
        );
    }

    /// Re-reads the state once the connection is back, first retrying the
    /// subscriptions if initialisation never completed.
    pub(crate) async fn mark_reconnected(self: &Arc<Self>) -> Result<(), MalcolmError> {
        let delay = self.settings.reconnect_fetch_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = if self.initialised.load(Ordering::SeqCst) {
            self.fetch_state().await?
        } else {
            debug!(device = %self.name, "retrying initialisation");
            self.establish().await?
        };
        self.alive.store(true, Ordering::SeqCst);
        self.transitions_published.store(true, Ordering::SeqCst);
        info!(device = %self.name, %state, "connection restored");
        self.publish(
            ScanProgressUpdate::transition(Some(DeviceState::Offline), state)
                .with_message(format!("connected to {}", self.name)),
        );
        Ok(())
    }
}

#[derive(Clone)]
struct Subscription {
    message: Message,
    listener: Arc<dyn MessageListener>,
}

#[derive(Clone)]
struct Subscriptions {
    state: Subscription,
    progress: Subscription,
}

/// Client-side controller for one remote Malcolm device.
///
/// Every operation is a request/reply exchange over the injected
/// [`Connection`]. State and progress notifications pushed by the device
/// are folded into a [`ScanProgress`] record and handed to the publisher.
pub struct MalcolmDevice {
    core: Arc<DeviceCore>,
    health: Mutex<Option<String>>,
    available_axes: Mutex<Vec<String>>,
    point_generator: Mutex<Option<PointGenerator>>,
    file_dir: Mutex<Option<String>>,
    first_run: AtomicBool,
}

#[bon]
impl MalcolmDevice {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        connection: Arc<dyn Connection>,
        publisher: Arc<dyn ScanProgressPublisher>,
        #[builder(default)] settings: DeviceSettings,
    ) -> Self {
        let progress = ScanProgress::new(name.clone());
        Self {
            core: Arc::new(DeviceCore {
                name,
                connection,
                messages: MessageGenerator::new(),
                publisher,
                settings,
                cached_state: Mutex::new(None),
                progress: Mutex::new(progress),
                alive: AtomicBool::new(false),
                transitions_published: AtomicBool::new(false),
                initialised: AtomicBool::new(false),
                watching_connection: AtomicBool::new(false),
                subscriptions: Mutex::new(None),
            }),
            health: Mutex::new(None),
            available_axes: Mutex::new(Vec::new()),
            point_generator: Mutex::new(None),
            file_dir: Mutex::new(None),
            first_run: AtomicBool::new(true),
        }
    }
}

impl MalcolmDevice {
    #[must_use]
    pub fn name(&self) -> &str {
        self.core.name()
    }

    #[must_use]
    pub fn settings(&self) -> &DeviceSettings {
        &self.core.settings
    }

    /// Seeds the cached state and subscribes to state, progress and connectivity.
    ///
    /// Connectivity is watched even when this fails, and a failed
    /// initialisation is retried once the connection comes back.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is already initialised, the state read
    /// fails, or either subscription is refused.
    #[instrument(skip(self), level = "info", fields(device = self.name()))]
    pub async fn initialize(&self) -> Result<(), MalcolmError> {
        if self.is_alive() {
            return Err(MalcolmError::AlreadyInitialised {
                device: self.name().to_string(),
            });
        }

        let established = self.core.establish().await;
        self.core.watch_connection();
        let state = established?;
        info!(%state, "device initialised");
        Ok(())
    }

    /// Whether the device is initialised and its connection is up.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.core.alive.load(Ordering::SeqCst)
    }

    /// Last state read from or pushed by the device.
    #[must_use]
    pub fn cached_state(&self) -> Option<DeviceState> {
        self.core.cached_state()
    }

    /// Last health text read from the device.
    #[must_use]
    pub fn cached_health(&self) -> Option<String> {
        lock(&self.health).clone()
    }

    /// Snapshot of the scan progress record.
    #[must_use]
    pub fn progress(&self) -> ScanProgress {
        lock(&self.core.progress).clone()
    }

    /// Reads the current remote state.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the device reports an unknown state.
    #[instrument(skip(self), level = "debug", fields(device = self.name()))]
    pub async fn get_device_state(&self) -> Result<DeviceState, MalcolmError> {
        self.core.fetch_state().await
    }

    /// Reads the current remote health text.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    #[instrument(skip(self), level = "debug", fields(device = self.name()))]
    pub async fn get_device_health(&self) -> Result<String, MalcolmError> {
        let attribute = self.core.fetch(EndpointId::Health).await?;
        let health = attribute.as_text().unwrap_or_default().to_string();
        *lock(&self.health) = Some(health.clone());
        Ok(health)
    }

    /// Whether the device is anywhere other than a rest state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state read fails.
    pub async fn is_device_busy(&self) -> Result<bool, MalcolmError> {
        Ok(!self.get_device_state().await?.is_rest_state())
    }

    /// Asks the device to check `model` without changing its state.
    ///
    /// # Errors
    ///
    /// Returns [`MalcolmError::Validation`] when the device rejects the
    /// parameters, or another error if they cannot be assembled or sent.
    #[instrument(skip_all, level = "info", fields(device = self.name(), model = model.name()))]
    pub async fn validate(&self, model: &MalcolmModel) -> Result<(), MalcolmError> {
        self.send_validate(model).await.map(drop)
    }

    /// Like [`Self::validate`], returning the parameters the device would apply.
    ///
    /// # Errors
    ///
    /// As [`Self::validate`], plus a payload error if the returned parameters
    /// cannot be decoded.
    #[instrument(skip_all, level = "info", fields(device = self.name(), model = model.name()))]
    pub async fn validate_with_return(
        &self,
        model: &MalcolmModel,
    ) -> Result<ConfigureParameters, MalcolmError> {
        let reply = self.send_validate(model).await?;
        serde_json::from_value(reply.value().cloned().unwrap_or(Value::Null)).map_err(|source| {
            MalcolmError::Payload {
                device: self.name().to_string(),
                source,
            }
        })
    }

    async fn send_validate(&self, model: &MalcolmModel) -> Result<Message, MalcolmError> {
        let parameters = self.configure_parameters(model).await?;
        let request = self
            .core
            .messages
            .call(CallMethod::Validate, Some(self.encode(&parameters)?));
        let reply = self.core.exchange(request).await?;

        match reply.message_type() {
            MessageType::Return => Ok(reply),
            MessageType::Error => {
                let field_names = reply.value().map(invalid_fields).unwrap_or_default();
                Err(ValidationError::new(reply.error_text().unwrap_or_default(), field_names).into())
            }
            other => Err(self.unexpected(MessageType::Call, other)),
        }
    }

    /// Resets the device, then configures it for `model`.
    ///
    /// A failed reset is logged and configuration goes ahead; devices in a
    /// state with no reset transition refuse it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configure call is rejected or the parameters
    /// cannot be assembled.
    #[instrument(skip_all, level = "info", fields(device = self.name(), model = model.name()))]
    pub async fn configure(&self, model: &MalcolmModel) -> Result<(), MalcolmError> {
        let parameters = self.configure_parameters(model).await?;
        if let Err(error) = self.call(CallMethod::Reset, None).await {
            warn!(%error, "reset before configure failed");
        }
        self.call(CallMethod::Configure, Some(self.encode(&parameters)?))
            .await?;

        let size = parameters.generator().size();
        self.core.merge_progress(ScanProgressUpdate {
            size: Some(size),
            point: Some(0),
            percent_complete: Some(0.0),
            ..ScanProgressUpdate::default()
        });
        self.first_run.store(true, Ordering::SeqCst);
        info!(size, axes = ?parameters.axes_to_move(), "device configured");
        Ok(())
    }

    async fn configure_parameters(
        &self,
        model: &MalcolmModel,
    ) -> Result<ConfigureParameters, MalcolmError> {
        let generator = lock(&self.point_generator).clone().ok_or_else(|| {
            MalcolmError::MissingPointGenerator {
                device: self.name().to_string(),
            }
        })?;
        let file_dir = lock(&self.file_dir)
            .clone()
            .ok_or_else(|| MalcolmError::MissingFileDir {
                device: self.name().to_string(),
            })?;
        let simultaneous_axes = self.get_available_axes().await?;
        let file_template = self.core.settings.file_template_for(&file_dir);

        Ok(ConfigureParameters::package(
            model,
            generator,
            file_dir,
            file_template,
            &simultaneous_axes,
        ))
    }

    /// Starts a configured scan, optionally from `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call is rejected.
    #[instrument(skip_all, level = "info", fields(device = self.name()))]
    pub async fn run(&self, position: Option<&Position>) -> Result<(), MalcolmError> {
        let arguments = position
            .map(|position| self.encode(position).map(|value| json!({ "position": value })))
            .transpose()?;

        if self.first_run.swap(false, Ordering::SeqCst) {
            self.core.publish(ScanProgressUpdate {
                start_time: Some(OffsetDateTime::now_utc()),
                message: Some("Starting scan".to_string()),
                ..ScanProgressUpdate::default()
            });
        }

        self.call(CallMethod::Run, arguments).await
    }

    /// Moves a paused or armed device to `step`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call is rejected.
    #[instrument(skip(self), level = "info", fields(device = self.name()))]
    pub async fn seek(&self, step: u64) -> Result<(), MalcolmError> {
        // The device exposes repositioning as a pause to a given step.
        self.call(CallMethod::Pause, Some(json!({ "completedSteps": step })))
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the call is rejected.
    #[instrument(skip(self), level = "info", fields(device = self.name()))]
    pub async fn pause(&self) -> Result<(), MalcolmError> {
        self.call(CallMethod::Pause, None).await
    }

    /// # Errors
    ///
    /// Returns an error if the call is rejected.
    #[instrument(skip(self), level = "info", fields(device = self.name()))]
    pub async fn resume(&self) -> Result<(), MalcolmError> {
        self.call(CallMethod::Resume, None).await
    }

    /// # Errors
    ///
    /// Returns an error if the call is rejected.
    #[instrument(skip(self), level = "info", fields(device = self.name()))]
    pub async fn abort(&self) -> Result<(), MalcolmError> {
        self.call(CallMethod::Abort, None).await
    }

    /// # Errors
    ///
    /// Returns an error if the call is rejected.
    #[instrument(skip(self), level = "info", fields(device = self.name()))]
    pub async fn reset(&self) -> Result<(), MalcolmError> {
        self.call(CallMethod::Reset, None).await
    }

    /// # Errors
    ///
    /// Returns an error if the call is rejected.
    #[instrument(skip(self), level = "info", fields(device = self.name()))]
    pub async fn disable(&self) -> Result<(), MalcolmError> {
        self.call(CallMethod::Disable, None).await
    }

    async fn call(&self, method: CallMethod, arguments: Option<Value>) -> Result<(), MalcolmError> {
        let reply = self
            .core
            .exchange(self.core.messages.call(method, arguments))
            .await?;
        match reply.message_type() {
            MessageType::Return => Ok(()),
            MessageType::Error => Err(self.core.device_error(&reply)),
            other => Err(self.unexpected(MessageType::Call, other)),
        }
    }

    /// Tears down both subscriptions and closes the connection.
    ///
    /// Calling this more than once repeats the teardown.
    ///
    /// # Errors
    ///
    /// Returns the first transport error hit while tearing down.
    #[instrument(skip(self), level = "info", fields(device = self.name()))]
    pub async fn dispose(&self) -> Result<(), MalcolmError> {
        let subscriptions = lock(&self.core.subscriptions).clone();
        if let Some(subscriptions) = subscriptions {
            self.core.unsubscribe(&subscriptions.state).await?;
            self.core.unsubscribe(&subscriptions.progress).await?;
        }
        self.core.connection.disconnect().await?;
        self.core.alive.store(false, Ordering::SeqCst);
        info!("device disposed");
        Ok(())
    }

    /// Reads the axes the device can move simultaneously and caches them.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    #[instrument(skip(self), level = "debug", fields(device = self.name()))]
    pub async fn get_available_axes(&self) -> Result<Vec<String>, MalcolmError> {
        let axes = match self
            .core
            .fetch(EndpointId::SimultaneousAxes)
            .await?
            .into_value()
        {
            AttributeValue::StringArray(axes) => axes,
            _ => Vec::new(),
        };
        lock(&self.available_axes).clone_from(&axes);
        Ok(axes)
    }

    /// Reads the table of datasets the device writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    #[instrument(skip(self), level = "debug", fields(device = self.name()))]
    pub async fn get_datasets(&self) -> Result<Table, MalcolmError> {
        match self.core.fetch(EndpointId::Datasets).await?.into_value() {
            AttributeValue::Table(table) => Ok(table),
            _ => Ok(Table::default()),
        }
    }

    /// Reads any attribute by its remote name.
    ///
    /// # Errors
    ///
    /// Returns a device error when the block has no such member, or an
    /// attribute error when the member is not an attribute.
    #[instrument(skip(self), level = "debug", fields(device = self.name()))]
    pub async fn get_attribute(&self, name: &str) -> Result<Attribute, MalcolmError> {
        let reply = self
            .core
            .exchange(self.core.messages.get_named(name))
            .await?;
        match reply.message_type() {
            MessageType::Return => reply
                .value()
                .ok_or_else(|| AttributeError::MissingValue {
                    name: name.to_string(),
                })
                .and_then(|payload| Attribute::decode(name, payload))
                .map_err(|source| self.attribute_error(source)),
            MessageType::Error => Err(self.core.device_error(&reply)),
            other => Err(self.unexpected(MessageType::Get, other)),
        }
    }

    /// Reads the whole block and returns the members that are attributes.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the reply is not a block.
    #[instrument(skip(self), level = "debug", fields(device = self.name()))]
    pub async fn get_all_attributes(&self) -> Result<Vec<Attribute>, MalcolmError> {
        let reply = self.core.exchange(self.core.messages.get_block()).await?;
        match reply.message_type() {
            MessageType::Return => {}
            MessageType::Error => return Err(self.core.device_error(&reply)),
            other => return Err(self.unexpected(MessageType::Get, other)),
        }

        let Some(Value::Object(block)) = reply.value() else {
            return Err(self.attribute_error(AttributeError::Malformed {
                name: self.name().to_string(),
                reason: "block reply is not an object".to_string(),
            }));
        };
        let attributes = block
            .iter()
            .filter_map(|(name, payload)| match Attribute::decode(name, payload) {
                Ok(attribute) => Some(attribute),
                Err(error) => {
                    trace!(member = %name, %error, "skipping block member");
                    None
                }
            })
            .collect();
        Ok(attributes)
    }

    /// Whether the device is part-way through a transition.
    ///
    /// # Errors
    ///
    /// Returns an error if the state read fails.
    pub async fn is_locked(&self) -> Result<bool, MalcolmError> {
        Ok(self.get_device_state().await?.is_running_state())
    }

    /// Whether the device speaks the current protocol, detected by a
    /// successful string-array read of `simultaneousAxes`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the request itself cannot be delivered.
    #[instrument(skip(self), level = "debug", fields(device = self.name()))]
    pub async fn is_new_malcolm_version(&self) -> Result<bool, MalcolmError> {
        let reply = self
            .core
            .exchange(self.core.messages.get(EndpointId::SimultaneousAxes))
            .await?;
        if reply.message_type() != MessageType::Return {
            return Ok(false);
        }
        Ok(matches!(
            reply
                .attribute(EndpointId::SimultaneousAxes)
                .map(Attribute::into_value),
            Ok(AttributeValue::StringArray(_))
        ))
    }

    /// Reads the server version, falling back to [`MalcolmVersion::FALLBACK`]
    /// when the device does not report one.
    ///
    /// # Errors
    ///
    /// Returns an error only when the request itself cannot be delivered.
    #[instrument(skip(self), level = "debug", fields(device = self.name()))]
    pub async fn get_version(&self) -> Result<MalcolmVersion, MalcolmError> {
        match self.core.fetch(EndpointId::Version).await {
            Ok(attribute) => Ok(MalcolmVersion::parse_or_fallback(
                attribute.as_text().unwrap_or_default(),
            )),
            Err(error @ MalcolmError::Connection(_)) => Err(error),
            Err(error) => {
                warn!(%error, "device did not report a version");
                Ok(MalcolmVersion::FALLBACK)
            }
        }
    }

    /// Axes cached by the last successful [`Self::get_available_axes`].
    #[must_use]
    pub fn cached_available_axes(&self) -> Vec<String> {
        lock(&self.available_axes).clone()
    }

    pub fn set_point_generator(&self, generator: PointGenerator) {
        *lock(&self.point_generator) = Some(generator);
    }

    pub fn set_file_dir(&self, file_dir: impl Into<String>) {
        *lock(&self.file_dir) = Some(file_dir.into());
    }

    fn encode(&self, payload: &impl serde::Serialize) -> Result<Value, MalcolmError> {
        serde_json::to_value(payload).map_err(|source| MalcolmError::Payload {
            device: self.name().to_string(),
            source,
        })
    }

    fn attribute_error(&self, source: AttributeError) -> MalcolmError {
        MalcolmError::Attribute {
            device: self.name().to_string(),
            source,
        }
    }

    fn unexpected(&self, request: MessageType, reply: MessageType) -> MalcolmError {
        MalcolmError::UnexpectedReply {
            device: self.name().to_string(),
            request,
            reply,
        }
    }
}

/// Field names carried by a VALIDATE error, either as a bare string array or
/// as a string-array attribute.
fn invalid_fields(value: &Value) -> Vec<String> {
    if let Ok(names) = serde_json::from_value(value.clone()) {
        return names;
    }
    match Attribute::decode("fields", value).map(Attribute::into_value) {
        Ok(AttributeValue::StringArray(names)) => names,
        _ => Vec::new(),
    }
}
