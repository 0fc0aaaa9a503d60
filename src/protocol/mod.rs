mod attribute;
mod endpoint;
mod message;

pub use self::attribute::{Attribute, AttributeError, AttributeKind, AttributeValue, Table};
pub use self::endpoint::{CallMethod, EndpointId};
pub(crate) use self::endpoint::endpoint_metadata;
pub use self::message::{Message, MessageGenerator, MessageType};
