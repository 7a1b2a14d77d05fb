//! # Event publishing
//!
//! The upstream side of the campaign wire. Both real implementations emit
//! the same JSON event; the managed transport attaches attributes and lets
//! the provider build the push envelope, while the loopback transport
//! builds the envelope itself and posts straight to the ingest endpoint,
//! which cannot tell the two apart.

use crate::event::{
    ATTR_MERCHANT_ID, ATTR_NOTIFICATION_ID, ATTR_REQUEST_ID, NotificationEvent, PushEnvelope,
    REQUEST_ID_HEADER,
};
use async_trait::async_trait;
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::client::{Client, ClientConfig};
use google_cloud_pubsub::publisher::Publisher;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// How long the loopback transport waits for the worker to accept an event.
const LOOPBACK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("publish transport error: {0}")]
    Transport(String),
    #[error("loopback endpoint rejected the event with status {0}")]
    Endpoint(u16),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Hands one event to the transport and waits for its acknowledgement.
    ///
    /// # Errors
    ///
    /// Fails when the event cannot be encoded or the transport refuses it;
    /// the caller decides whether the triggering operation fails with it.
    async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError>;

    /// Flushes and releases transport resources. Runs once, on shutdown.
    async fn close(&self);
}

/// Managed pub/sub topic transport.
pub struct PubsubPublisher {
    publisher: Mutex<Publisher>,
}

impl PubsubPublisher {
    /// Connects to the configured project and topic using ambient Google
    /// credentials.
    ///
    /// # Errors
    ///
    /// Fails when credentials are unusable or the client cannot be built.
    pub async fn new(
        project_id: impl Into<String>,
        topic_id: &str,
    ) -> Result<Self, PublishError> {
        let mut config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        config.project_id = Some(project_id.into());
        let client = Client::new(config)
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        let topic = client.topic(topic_id);
        Ok(Self {
            publisher: Mutex::new(topic.new_publisher(None)),
        })
    }
}

#[async_trait]
impl EventPublisher for PubsubPublisher {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError> {
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

        let message = PubsubMessage {
            data: serde_json::to_vec(event)?.into(),
            attributes,
            ..Default::default()
        };

        // Wait for the server ack; a lost publish must fail the caller.
        let awaiter = self.publisher.lock().await.publish(message).await;
        awaiter
            .get()
            .await
            .map(|_| ())
            .map_err(|e| PublishError::Transport(e.to_string()))
    }

    async fn close(&self) {
        self.publisher.lock().await.shutdown().await;
    }
}

/// Local HTTP loopback transport: wraps the event in the provider envelope
/// and posts it to the worker's own push endpoint.
pub struct LoopbackPublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl LoopbackPublisher {
    /// # Errors
    ///
    /// Fails only if the HTTP client cannot be constructed.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(LOOPBACK_TIMEOUT)
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl EventPublisher for LoopbackPublisher {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError> {
        let envelope = PushEnvelope::wrap(event)?;
        let request_id = event
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let response = self
            .client
            .post(&self.endpoint)
            .header(REQUEST_ID_HEADER, request_id)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(PublishError::Endpoint(response.status().as_u16()))
        }
    }

    async fn close(&self) {}
}

/// For environments with no messaging configured at all.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError> {
        debug!(
            notification_id = %event.notification_id,
            "event publishing disabled; dropping event"
        );
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> NotificationEvent {
        NotificationEvent {
            request_id: Some("req-1".to_string()),
            notification_id: Uuid::new_v4().to_string(),
            merchant_id: Uuid::new_v4().to_string(),
            latitude: 25.0,
            longitude: 121.5,
            location_name: "Stand".to_string(),
            full_address: "Somewhere 1".to_string(),
            hint_message: None,
            subscriber_ids: vec![],
        }
    }

    #[tokio::test]
    async fn noop_publisher_accepts_everything() {
        let publisher = NoopPublisher;
        publisher.publish(&sample_event()).await.unwrap();
        publisher.close().await;
    }

    #[tokio::test]
    async fn loopback_surfaces_connection_failures_as_transport_errors() {
        // Nothing listens on port 9; the send itself must fail.
        let publisher = LoopbackPublisher::new("http://127.0.0.1:9/push").unwrap();
        let err = publisher.publish(&sample_event()).await.unwrap_err();
        assert!(matches!(err, PublishError::Transport(_)));
    }
}
