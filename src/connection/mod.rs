//! Transport-facing seam between the device controller and a Malcolm server.
//!
//! The controller only needs request/reply exchange plus push delivery to
//! registered listeners; how messages travel is up to the implementation.

mod fake;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::Message;

pub use self::fake::{AxisList, FakeConnection, FakeDeviceConfig, SentMessage, StateFixture};

/// Transport failures raised by a [`Connection`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("connection to `{device}` is closed")]
    Closed { device: String },
    #[error("transport failure talking to `{device}`: {reason}")]
    Transport { device: String, reason: String },
    #[error("`{device}` has no subscription with id {id}")]
    UnknownSubscription { device: String, id: u64 },
}

/// Receives pushed UPDATE messages for one subscription.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn event_performed(&self, message: Message);
}

/// Receives connectivity changes for one device.
#[async_trait]
pub trait ConnectionStateListener: Send + Sync {
    async fn connection_changed(&self, connected: bool);
}

/// Message exchange with a remote Malcolm device.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Sends one request and waits for its correlated reply.
    async fn send(&self, device: &str, message: Message) -> Result<Message, ConnectionError>;

    /// Registers `listener` for UPDATEs on the endpoint named by `message`.
    async fn subscribe(
        &self,
        device: &str,
        message: Message,
        listener: Arc<dyn MessageListener>,
    ) -> Result<(), ConnectionError>;

    /// Tears down the subscription whose id `message` carries.
    async fn unsubscribe(
        &self,
        device: &str,
        message: Message,
        listener: Arc<dyn MessageListener>,
    ) -> Result<(), ConnectionError>;

    /// Registers `listener` for connectivity changes.
    async fn subscribe_to_connection_state_change(
        &self,
        device: &str,
        listener: Arc<dyn ConnectionStateListener>,
    ) -> Result<(), ConnectionError>;

    async fn disconnect(&self) -> Result<(), ConnectionError>;
}
