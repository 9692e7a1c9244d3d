use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::error::DeliveryError;

/// Payload of a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Body {
    Text(String),
    Bytes(Vec<u8>),
}

impl Body {
    fn kind(&self) -> &'static str {
        match self {
            Body::Text(_) => "text",
            Body::Bytes(_) => "bytes",
        }
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes)
    }
}

/// A message published to a topic and delivered through a durable subscription.
///
/// # Fields
///
/// - `message_id` - UUID assigned at publish time. Every subscription copy shares it.
/// - `topic` - Name of the topic the message was published to.
/// - `body` - Opaque payload.
/// - `timestamp` - Milliseconds since the UNIX epoch, set by the broker.
/// - `delivery_count` - How many times this copy has been handed to a consumer.
///   `1` on first delivery; every redelivery after a rollback increments it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub topic: String,
    pub body: Body,
    pub timestamp: i64,
    pub delivery_count: u32,
}

impl Message {
    pub fn new(topic: &str, body: impl Into<Body>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            body: body.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            delivery_count: 0,
        }
    }

    /// Reads the body as text.
    pub fn text(&self) -> Result<&str, DeliveryError> {
        match &self.body {
            Body::Text(text) => Ok(text),
            other => Err(DeliveryError::UnexpectedBody {
                message_id: self.message_id.clone(),
                expected: "text",
                actual: other.kind(),
            }),
        }
    }

    /// Decodes a text or bytes body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, DeliveryError> {
        let decoded = match &self.body {
            Body::Text(text) => serde_json::from_str(text),
            Body::Bytes(bytes) => serde_json::from_slice(bytes),
        };
        decoded.map_err(|e| DeliveryError::Malformed {
            message_id: self.message_id.clone(),
            reason: e.to_string(),
        })
    }

    pub fn is_redelivered(&self) -> bool {
        self.delivery_count > 1
    }
}
