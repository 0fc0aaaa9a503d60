use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use serde_json::{Value, json};
use strum::IntoEnumIterator;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, trace};

use super::{Connection, ConnectionError, ConnectionStateListener, MessageListener};
use crate::device::DeviceState;
use crate::error::FixtureError;
use crate::protocol::{
    Attribute, AttributeValue, CallMethod, EndpointId, Message, MessageType, Table,
};
use crate::utils::lock;

const DEFAULT_AXES: [&str; 2] = ["stage_x", "stage_y"];
const BLOCK_META: &str = "malcolm:core/BlockMeta:1.0";

/// Parsed fake device state fixture.
#[derive(Debug, Clone, Copy, derive_more::Into)]
pub struct StateFixture {
    state: DeviceState,
}

impl FromStr for StateFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let state = value
            .trim()
            .parse()
            .map_err(|_error| FixtureError::UnknownState {
                value: value.to_string(),
            })?;
        Ok(Self { state })
    }
}

/// Parsed comma-separated axis list fixture.
#[derive(Debug, Clone, derive_more::Into)]
pub struct AxisList {
    axes: Vec<String>,
}

impl FromStr for AxisList {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Ok(Self { axes: Vec::new() });
        }
        let axes = value
            .split(',')
            .map(str::trim)
            .map(|axis| {
                if axis.is_empty() {
                    Err(FixtureError::EmptyAxisName)
                } else {
                    Ok(axis.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { axes })
    }
}

/// Settings for constructing a simulated Malcolm device.
#[derive(Debug, Builder)]
pub struct FakeDeviceConfig {
    #[builder(default = DeviceState::Ready)]
    state: DeviceState,
    #[builder(into, default = "OK".to_string())]
    health: String,
    #[builder(default = DEFAULT_AXES.map(String::from).to_vec())]
    axes: Vec<String>,
    /// Reported server version; the endpoint errors when unset.
    #[builder(into)]
    version: Option<String>,
    /// Answer `simultaneousAxes` reads with an ERROR, as pre-4.x servers do.
    #[builder(default)]
    legacy_protocol: bool,
    /// Smallest dwell time VALIDATE accepts; shorter durations are raised to it.
    #[builder(default)]
    minimum_duration: f64,
    /// Pause between emitted `completedSteps` updates while running.
    #[builder(default)]
    step_delay: Duration,
}

impl Default for FakeDeviceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// One request observed by a [`FakeConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    device: String,
    message: Message,
}

impl SentMessage {
    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }
}

struct FakeSubscription {
    request: Message,
    endpoint: EndpointId,
    listener: Arc<dyn MessageListener>,
}

#[derive(Debug)]
struct FakeDevice {
    state: DeviceState,
    health: String,
    axes: Vec<String>,
    datasets: Table,
    version: Option<String>,
    legacy_protocol: bool,
    minimum_duration: f64,
    completed_steps: u64,
    size: u64,
    failures: HashMap<CallMethod, (String, Option<Value>)>,
}

impl FakeDevice {
    fn attribute_value(&self, endpoint: EndpointId) -> Result<AttributeValue, String> {
        Ok(match endpoint {
            EndpointId::State => AttributeValue::Choice {
                value: self.state.to_string(),
                choices: DeviceState::iter().map(|state| state.to_string()).collect(),
            },
            EndpointId::Health => AttributeValue::String(self.health.clone()),
            EndpointId::CompletedSteps => AttributeValue::Number(self.completed_steps as f64),
            EndpointId::Busy => AttributeValue::Boolean(!self.state.is_rest_state()),
            EndpointId::SimultaneousAxes if self.legacy_protocol => {
                return Err("No attribute simultaneousAxes".to_string());
            }
            EndpointId::SimultaneousAxes => AttributeValue::StringArray(self.axes.clone()),
            EndpointId::Datasets => AttributeValue::Table(self.datasets.clone()),
            EndpointId::Version => match &self.version {
                Some(version) => AttributeValue::String(version.clone()),
                None => return Err("No attribute version".to_string()),
            },
        })
    }
}

/// In-process Malcolm device used in tests and when no server is reachable.
///
/// Requests are answered from a small state model. CALLs drive the state
/// the way a real device would and push the matching UPDATEs to subscribed
/// listeners before the reply is returned.
pub struct FakeConnection {
    device: Mutex<FakeDevice>,
    step_delay: Duration,
    connected: AtomicBool,
    sent: Mutex<Vec<SentMessage>>,
    subscriptions: Mutex<Vec<FakeSubscription>>,
    unsubscribed: Mutex<Vec<Message>>,
    connection_listeners: Mutex<Vec<Arc<dyn ConnectionStateListener>>>,
    listener_registered: Notify,
}

impl FakeConnection {
    #[must_use]
    pub fn new(config: FakeDeviceConfig) -> Self {
        let datasets = default_datasets(&config.axes);
        Self {
            device: Mutex::new(FakeDevice {
                state: config.state,
                health: config.health,
                axes: config.axes,
                datasets,
                version: config.version,
                legacy_protocol: config.legacy_protocol,
                minimum_duration: config.minimum_duration,
                completed_steps: 0,
                size: 0,
                failures: HashMap::new(),
            }),
            step_delay: config.step_delay,
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            unsubscribed: Mutex::new(Vec::new()),
            connection_listeners: Mutex::new(Vec::new()),
            listener_registered: Notify::new(),
        }
    }

    /// Makes every later `method` CALL answer with an ERROR carrying `text`.
    pub fn fail_method(&self, method: CallMethod, text: impl Into<String>) {
        lock(&self.device)
            .failures
            .insert(method, (text.into(), None));
    }

    /// Like [`Self::fail_method`], with a payload attached to the ERROR.
    pub fn fail_method_with_value(&self, method: CallMethod, text: impl Into<String>, value: Value) {
        lock(&self.device)
            .failures
            .insert(method, (text.into(), Some(value)));
    }

    #[must_use]
    pub fn state(&self) -> DeviceState {
        lock(&self.device).state
    }

    /// Every request received so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    /// Methods of every CALL received so far, oldest first.
    #[must_use]
    pub fn sent_methods(&self) -> Vec<CallMethod> {
        lock(&self.sent)
            .iter()
            .filter_map(|sent| sent.message.method())
            .collect()
    }

    /// SUBSCRIBE requests that are still active.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Message> {
        lock(&self.subscriptions)
            .iter()
            .map(|subscription| subscription.request.clone())
            .collect()
    }

    /// UNSUBSCRIBE requests received so far.
    #[must_use]
    pub fn unsubscribed(&self) -> Vec<Message> {
        lock(&self.unsubscribed).clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Waits until at least one connection-state listener is registered.
    pub async fn wait_for_connection_listener(&self) {
        loop {
            let registered = self.listener_registered.notified();
            if !lock(&self.connection_listeners).is_empty() {
                return;
            }
            registered.await;
        }
    }

    /// Flips connectivity and notifies every connection-state listener.
    pub async fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        let listeners = lock(&self.connection_listeners).clone();
        for listener in listeners {
            listener.connection_changed(connected).await;
        }
    }

    /// Moves the device to `state` without notifying subscribers.
    pub fn set_state(&self, state: DeviceState) {
        lock(&self.device).state = state;
    }

    /// Moves the device to `state` and pushes the change to subscribers.
    pub async fn push_state(&self, state: DeviceState) {
        lock(&self.device).state = state;
        self.push_update(EndpointId::State, state_payload(state))
            .await;
    }

    /// Pushes a raw attribute payload to every subscriber of `endpoint`.
    pub async fn push_update(&self, endpoint: EndpointId, value: Value) {
        let targets: Vec<(Message, Arc<dyn MessageListener>)> = lock(&self.subscriptions)
            .iter()
            .filter(|subscription| subscription.endpoint == endpoint)
            .map(|subscription| {
                (
                    subscription.request.clone(),
                    Arc::clone(&subscription.listener),
                )
            })
            .collect();

        trace!(%endpoint, subscribers = targets.len(), "pushing update");
        for (request, listener) in targets {
            let update = Message::update_for(&request, value.clone())
                .with_raw_value(value.to_string());
            listener.event_performed(update).await;
        }
    }

    async fn push_steps(&self, step: u64) {
        lock(&self.device).completed_steps = step;
        self.push_update(
            EndpointId::CompletedSteps,
            Attribute::new(
                EndpointId::CompletedSteps.to_string(),
                AttributeValue::Number(step as f64),
                false,
            )
            .to_payload(),
        )
        .await;
    }

    fn answer_get(&self, request: &Message) -> Message {
        let endpoint = match request.endpoint() {
            None | Some("") => return self.answer_block_get(request),
            Some(endpoint) => endpoint,
        };
        let Ok(endpoint) = endpoint.parse::<EndpointId>() else {
            return Message::error_for(request, "No such endpoint");
        };

        let value = lock(&self.device).attribute_value(endpoint);
        match value {
            Ok(value) => {
                let payload = Attribute::new(endpoint.to_string(), value, false).to_payload();
                let raw_value = payload.to_string();
                Message::return_for(request, Some(payload)).with_raw_value(raw_value)
            }
            Err(text) => Message::error_for(request, text),
        }
    }

    /// Answers a whole-block GET with every readable attribute plus the block meta.
    fn answer_block_get(&self, request: &Message) -> Message {
        let device = lock(&self.device);
        let mut block = serde_json::Map::new();
        block.insert(
            "meta".to_string(),
            json!({ "typeid": BLOCK_META, "description": "Simulated scan block" }),
        );
        for endpoint in EndpointId::iter() {
            if let Ok(value) = device.attribute_value(endpoint) {
                let attribute = Attribute::new(endpoint.to_string(), value, false);
                block.insert(endpoint.to_string(), attribute.to_payload());
            }
        }
        Message::return_for(request, Some(Value::Object(block)))
    }

    async fn answer_call(&self, request: &Message) -> Message {
        let Some(method) = request.method() else {
            return Message::error_for(request, "CALL without a method");
        };

        let (state, failure) = {
            let device = lock(&self.device);
            (device.state, device.failures.get(&method).cloned())
        };
        if let Some((text, value)) = failure {
            let reply = Message::error_for(request, text);
            return match value {
                Some(value) => reply.with_value(value),
                None => reply,
            };
        }
        if !accepts(method, state) {
            return Message::error_for(request, format!("Can't {method} in state {state}"));
        }

        debug!(%method, %state, "simulating call");
        let arguments = request.arguments();
        match method {
            CallMethod::Validate => {
                return Message::return_for(request, arguments.map(|value| self.validated(value)));
            }
            CallMethod::Reset => {
                self.push_state(DeviceState::Resetting).await;
                lock(&self.device).completed_steps = 0;
                self.push_state(DeviceState::Ready).await;
            }
            CallMethod::Configure => {
                let size = arguments
                    .and_then(|value| value.pointer("/generator/size"))
                    .and_then(Value::as_u64)
                    .unwrap_or_default();
                self.push_state(DeviceState::Configuring).await;
                lock(&self.device).size = size;
                self.push_state(DeviceState::Armed).await;
            }
            CallMethod::Run => {
                let start = arguments
                    .and_then(|value| value.pointer("/position/step"))
                    .and_then(Value::as_u64);
                self.run_steps(start).await;
            }
            CallMethod::Pause => {
                let target = arguments
                    .and_then(|value| value.get("completedSteps"))
                    .and_then(Value::as_u64);
                if let Some(step) = target {
                    self.push_state(DeviceState::Seeking).await;
                    self.push_steps(step).await;
                }
                self.push_state(DeviceState::Paused).await;
            }
            CallMethod::Resume => self.push_state(DeviceState::Running).await,
            CallMethod::Abort => {
                self.push_state(DeviceState::Aborting).await;
                self.push_state(DeviceState::Aborted).await;
            }
            CallMethod::Disable => {
                self.push_state(DeviceState::Disabling).await;
                self.push_state(DeviceState::Disabled).await;
            }
        }
        Message::return_for(request, None)
    }

    async fn run_steps(&self, start: Option<u64>) {
        let (first, size) = {
            let device = lock(&self.device);
            (start.unwrap_or(device.completed_steps), device.size)
        };

        self.push_state(DeviceState::Running).await;
        for step in first + 1..=size {
            if !self.step_delay.is_zero() {
                sleep(self.step_delay).await;
            }
            self.push_steps(step).await;
        }
        self.push_state(DeviceState::Finished).await;
    }

    /// Echoes VALIDATE arguments, raising the dwell time to the device minimum.
    fn validated(&self, arguments: &Value) -> Value {
        let minimum = lock(&self.device).minimum_duration;
        let mut parameters = arguments.clone();
        if let Some(duration) = parameters.pointer_mut("/generator/duration")
            && duration.as_f64().is_some_and(|value| value < minimum)
        {
            *duration = json!(minimum);
        }
        parameters
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn send(&self, device: &str, message: Message) -> Result<Message, ConnectionError> {
        if !self.is_connected() {
            return Err(ConnectionError::Closed {
                device: device.to_string(),
            });
        }
        lock(&self.sent).push(SentMessage {
            device: device.to_string(),
            message: message.clone(),
        });

        let reply = match message.message_type() {
            MessageType::Get => self.answer_get(&message),
            MessageType::Call => self.answer_call(&message).await,
            other => Message::error_for(&message, format!("{other} is not a request")),
        };
        Ok(reply)
    }

    async fn subscribe(
        &self,
        device: &str,
        message: Message,
        listener: Arc<dyn MessageListener>,
    ) -> Result<(), ConnectionError> {
        let endpoint = message
            .endpoint()
            .and_then(|endpoint| endpoint.parse::<EndpointId>().ok())
            .ok_or_else(|| ConnectionError::Transport {
                device: device.to_string(),
                reason: format!("cannot subscribe to {:?}", message.endpoint()),
            })?;
        lock(&self.subscriptions).push(FakeSubscription {
            request: message,
            endpoint,
            listener,
        });
        Ok(())
    }

    async fn unsubscribe(
        &self,
        device: &str,
        message: Message,
        _listener: Arc<dyn MessageListener>,
    ) -> Result<(), ConnectionError> {
        let mut subscriptions = lock(&self.subscriptions);
        let Some(index) = subscriptions
            .iter()
            .position(|subscription| subscription.request.id() == message.id())
        else {
            return Err(ConnectionError::UnknownSubscription {
                device: device.to_string(),
                id: message.id(),
            });
        };
        subscriptions.remove(index);
        lock(&self.unsubscribed).push(message);
        Ok(())
    }

    async fn subscribe_to_connection_state_change(
        &self,
        _device: &str,
        listener: Arc<dyn ConnectionStateListener>,
    ) -> Result<(), ConnectionError> {
        lock(&self.connection_listeners).push(listener);
        self.listener_registered.notify_waiters();
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Whether the simulated device accepts `method` while in `state`.
fn accepts(method: CallMethod, state: DeviceState) -> bool {
    match method {
        CallMethod::Validate | CallMethod::Reset | CallMethod::Abort | CallMethod::Disable => true,
        CallMethod::Configure => state == DeviceState::Ready,
        CallMethod::Run => matches!(state, DeviceState::Armed | DeviceState::Paused),
        CallMethod::Pause => matches!(
            state,
            DeviceState::Armed | DeviceState::Running | DeviceState::Paused
        ),
        CallMethod::Resume => state == DeviceState::Paused,
    }
}

fn state_payload(state: DeviceState) -> Value {
    Attribute::new(
        EndpointId::State.to_string(),
        AttributeValue::Choice {
            value: state.to_string(),
            choices: DeviceState::iter().map(|state| state.to_string()).collect(),
        },
        false,
    )
    .to_payload()
}

fn default_datasets(axes: &[String]) -> Table {
    let mut names = vec!["det.data".to_string(), "det.sum".to_string()];
    let mut types = vec![json!("primary"), json!("secondary")];
    for axis in axes {
        names.push(format!("{axis}.value_set"));
        types.push(json!("position_set"));
    }
    let rank = vec![json!(4); names.len()];
    let names: Vec<Value> = names.into_iter().map(Value::from).collect();

    Table::from_columns([
        ("name".to_string(), names),
        ("type".to_string(), types),
        ("rank".to_string(), rank),
    ])
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::protocol::MessageGenerator;

    #[rstest]
    #[case("stage_x", vec!["stage_x"])]
    #[case("stage_x, stage_y", vec!["stage_x", "stage_y"])]
    #[case("", vec![])]
    fn axis_list_parses_comma_separated_names(#[case] raw: &str, #[case] expected: Vec<&str>) {
        let axes: Vec<String> = raw.parse::<AxisList>().expect("axes should parse").into();
        assert_eq!(expected, axes);
    }

    #[test]
    fn axis_list_rejects_empty_entry() {
        assert_matches!(
            "stage_x,,stage_y".parse::<AxisList>(),
            Err(FixtureError::EmptyAxisName)
        );
    }

    #[test]
    fn state_fixture_rejects_unknown_state() {
        assert_matches!(
            "Sleeping".parse::<StateFixture>(),
            Err(FixtureError::UnknownState { value }) if value == "Sleeping"
        );
    }

    #[tokio::test]
    async fn get_state_returns_choice_attribute() {
        let connection = FakeConnection::new(
            FakeDeviceConfig::builder()
                .state(DeviceState::Armed)
                .build(),
        );
        let messages = MessageGenerator::new();

        let reply = connection
            .send("det", messages.get(EndpointId::State))
            .await
            .expect("fake connection should answer");

        let attribute = reply
            .attribute(EndpointId::State)
            .expect("reply should carry state");
        assert_eq!(Some("Armed"), attribute.as_text());
        assert!(reply.raw_value().is_some());
    }

    #[tokio::test]
    async fn block_get_lists_readable_members() {
        let connection = FakeConnection::new(FakeDeviceConfig::default());
        let messages = MessageGenerator::new();

        let reply = connection
            .send("det", messages.get_block())
            .await
            .expect("fake connection should answer");

        let mut members: Vec<String> = reply
            .value()
            .and_then(Value::as_object)
            .map(|block| block.keys().cloned().collect())
            .unwrap_or_default();
        members.sort();
        assert_eq!(
            vec![
                "busy",
                "completedSteps",
                "datasets",
                "health",
                "meta",
                "simultaneousAxes",
                "state"
            ],
            members
        );
    }

    #[tokio::test]
    async fn run_from_ready_is_refused() {
        let connection = FakeConnection::new(FakeDeviceConfig::default());
        let messages = MessageGenerator::new();

        let reply = connection
            .send("det", messages.call(CallMethod::Run, None))
            .await
            .expect("fake connection should answer");

        assert_eq!(Some("Can't run in state Ready"), reply.error_text());
    }

    #[tokio::test]
    async fn validate_raises_short_durations() {
        let connection = FakeConnection::new(
            FakeDeviceConfig::builder().minimum_duration(0.01).build(),
        );
        let messages = MessageGenerator::new();
        let arguments = json!({ "generator": { "duration": 0.001, "size": 5 } });

        let reply = connection
            .send("det", messages.call(CallMethod::Validate, Some(arguments)))
            .await
            .expect("fake connection should answer");

        assert_eq!(
            Some(&json!({ "generator": { "duration": 0.01, "size": 5 } })),
            reply.value()
        );
    }

    #[tokio::test]
    async fn closed_connection_rejects_requests() {
        let connection = FakeConnection::new(FakeDeviceConfig::default());
        connection
            .disconnect()
            .await
            .expect("disconnect should succeed");

        let result = connection
            .send("det", MessageGenerator::new().get(EndpointId::Health))
            .await;

        assert_matches!(result, Err(ConnectionError::Closed { device }) if device == "det");
    }

    #[tokio::test]
    async fn unknown_unsubscribe_is_reported() {
        struct Ignore;

        #[async_trait]
        impl MessageListener for Ignore {
            async fn event_performed(&self, _message: Message) {}
        }

        let connection = FakeConnection::new(FakeDeviceConfig::default());
        let subscription = MessageGenerator::new().subscribe(EndpointId::State);

        let result = connection
            .unsubscribe("det", subscription, Arc::new(Ignore))
            .await;

        assert_matches!(result, Err(ConnectionError::UnknownSubscription { id: 1, .. }));
    }
}
