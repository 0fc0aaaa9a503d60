use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::Display;

use super::attribute::{Attribute, AttributeError};
use super::endpoint::{CallMethod, EndpointId};

/// Kind of protocol message.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum MessageType {
    Get,
    Put,
    Call,
    Subscribe,
    Unsubscribe,
    Unsubscribed,
    Return,
    Update,
    Error,
}

/// One immutable request, reply or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: u64,
    #[serde(rename = "type")]
    message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<CallMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl Message {
    fn bare(id: u64, message_type: MessageType) -> Self {
        Self {
            id,
            message_type,
            endpoint: None,
            method: None,
            arguments: None,
            value: None,
            raw_value: None,
            message: None,
        }
    }

    /// Builds a successful reply correlated with `request`.
    #[must_use]
    pub fn return_for(request: &Message, value: Option<Value>) -> Self {
        Self {
            endpoint: request.endpoint.clone(),
            value,
            ..Self::bare(request.id, MessageType::Return)
        }
    }

    /// Builds an error reply correlated with `request`.
    #[must_use]
    pub fn error_for(request: &Message, text: impl Into<String>) -> Self {
        Self {
            endpoint: request.endpoint.clone(),
            message: Some(text.into()),
            ..Self::bare(request.id, MessageType::Error)
        }
    }

    /// Builds a pushed update for a subscription.
    #[must_use]
    pub fn update_for(subscription: &Message, value: Value) -> Self {
        Self {
            endpoint: subscription.endpoint.clone(),
            value: Some(value),
            ..Self::bare(subscription.id, MessageType::Update)
        }
    }

    /// Attaches supplementary payload detail, such as an ERROR's field list.
    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Keeps the payload text exactly as it arrived.
    #[must_use]
    pub fn with_raw_value(mut self, raw_value: impl Into<String>) -> Self {
        self.raw_value = Some(raw_value.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    #[must_use]
    pub fn method(&self) -> Option<CallMethod> {
        self.method
    }

    #[must_use]
    pub fn arguments(&self) -> Option<&Value> {
        self.arguments.as_ref()
    }

    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn raw_value(&self) -> Option<&str> {
        self.raw_value.as_deref()
    }

    /// Error text carried by an ERROR reply.
    #[must_use]
    pub fn error_text(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.message_type == MessageType::Error
    }

    /// Decodes the payload as an attribute named after `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error when the message has no payload or the payload is not
    /// a recognised attribute.
    pub fn attribute(&self, endpoint: EndpointId) -> Result<Attribute, AttributeError> {
        let name = endpoint.to_string();
        let Some(value) = &self.value else {
            return Err(AttributeError::MissingValue { name });
        };
        Attribute::decode(&name, value)
    }
}

/// Allocates message ids and builds outgoing requests.
#[derive(Debug)]
pub struct MessageGenerator {
    next_id: AtomicU64,
}

impl Default for MessageGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    #[must_use]
    pub fn get(&self, endpoint: EndpointId) -> Message {
        self.get_named(&endpoint.to_string())
    }

    /// GET for an endpoint known only by its remote name.
    #[must_use]
    pub fn get_named(&self, endpoint: &str) -> Message {
        Message {
            endpoint: Some(endpoint.to_string()),
            ..Message::bare(self.allocate(), MessageType::Get)
        }
    }

    /// GET for the whole block; the reply maps every member name to its payload.
    #[must_use]
    pub fn get_block(&self) -> Message {
        Message::bare(self.allocate(), MessageType::Get)
    }

    #[must_use]
    pub fn call(&self, method: CallMethod, arguments: Option<Value>) -> Message {
        Message {
            endpoint: Some(method.to_string()),
            method: Some(method),
            arguments,
            ..Message::bare(self.allocate(), MessageType::Call)
        }
    }

    #[must_use]
    pub fn subscribe(&self, endpoint: EndpointId) -> Message {
        Message {
            endpoint: Some(endpoint.to_string()),
            ..Message::bare(self.allocate(), MessageType::Subscribe)
        }
    }

    /// Builds the teardown for `subscription`, reusing its id.
    #[must_use]
    pub fn unsubscribe(&self, subscription: &Message) -> Message {
        Message {
            endpoint: subscription.endpoint.clone(),
            ..Message::bare(subscription.id, MessageType::Unsubscribe)
        }
    }
}
