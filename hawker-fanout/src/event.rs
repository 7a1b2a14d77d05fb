//! # Wire types
//!
//! [`NotificationEvent`] is the message a merchant publish produces and the
//! worker consumes. On the managed transport it travels base64-encoded
//! inside the provider's push envelope; the local loopback publisher builds
//! the same envelope so the ingest endpoint cannot tell them apart.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hawker_roadgraph::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Envelope attribute carrying the trace id end to end.
pub const ATTR_REQUEST_ID: &str = "request_id";
pub const ATTR_NOTIFICATION_ID: &str = "notification_id";
pub const ATTR_MERCHANT_ID: &str = "merchant_id";

/// HTTP header carrying the trace id on the loopback transport.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// One merchant "I am open here" broadcast.
///
/// `subscriber_ids` is a candidate list pre-filtered at publish time; the
/// worker re-filters by actual road distance. Ids stay as strings on the
/// wire; validation is the pipeline's first step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub notification_id: String,
    pub merchant_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location_name: String,
    pub full_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_message: Option<String>,
    pub subscriber_ids: Vec<String>,
}

impl NotificationEvent {
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// The provider's push envelope as delivered to the ingest endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: EnvelopeMessage,
    #[serde(default)]
    pub subscription: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMessage {
    /// Base64 of the [`NotificationEvent`] JSON.
    pub data: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(rename = "messageId", default)]
    pub message_id: String,
    #[serde(rename = "publishTime", default)]
    pub publish_time: String,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("message data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("message data is not a notification event: {0}")]
    Json(#[from] serde_json::Error),
}

impl PushEnvelope {
    /// Wraps `event` the way the managed transport would, for the local
    /// loopback path.
    ///
    /// # Errors
    ///
    /// Fails only if the event cannot be serialized, which would be a bug in
    /// the event type itself.
    pub fn wrap(event: &NotificationEvent) -> Result<Self, serde_json::Error> {
        let mut attributes = HashMap::from([
            (
                ATTR_NOTIFICATION_ID.to_string(),
                event.notification_id.clone(),
            ),
            (ATTR_MERCHANT_ID.to_string(), event.merchant_id.clone()),
        ]);
        if let Some(request_id) = &event.request_id {
            attributes.insert(ATTR_REQUEST_ID.to_string(), request_id.clone());
        }
        Ok(Self {
            message: EnvelopeMessage {
                data: BASE64.encode(serde_json::to_vec(event)?),
                attributes,
                message_id: Uuid::new_v4().to_string(),
                publish_time: chrono::Utc::now().to_rfc3339(),
            },
            subscription: "local".to_string(),
        })
    }

    /// Decodes the enveloped event.
    ///
    /// # Errors
    ///
    /// Fails when `message.data` is not base64, or the decoded bytes are not
    /// a [`NotificationEvent`]. Both are non-retryable malformations.
    pub fn decode_event(&self) -> Result<NotificationEvent, EnvelopeError> {
        let bytes = BASE64.decode(&self.message.data)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Resolves the campaign's trace id by the ordered fallback: envelope
    /// attribute, event field, inbound header, fresh UUID.
    pub fn resolve_request_id(
        &self,
        event: &NotificationEvent,
        header: Option<&str>,
    ) -> String {
        self.message
            .attributes
            .get(ATTR_REQUEST_ID)
            .cloned()
            .or_else(|| event.request_id.clone())
            .or_else(|| header.map(ToString::to_string))
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}
