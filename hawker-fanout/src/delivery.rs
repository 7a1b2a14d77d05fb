//! # Push delivery provider
//!
//! The pipeline speaks [`PushDelivery`]; production uses the FCM HTTP v1 API
//! through [`FcmDelivery`], and deployments without credentials get
//! [`NoopDelivery`], which fails every chunk so campaigns are still logged
//! honestly.

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// The provider's hard per-request token cap.
pub const FCM_BATCH_LIMIT: usize = 500;

const FCM_SCOPE: &[&str] = &["https://www.googleapis.com/auth/firebase.messaging"];

/// Per-token error codes the provider uses for dead registrations.
const INVALID_TOKEN_CODES: [&str; 2] = ["UNREGISTERED", "INVALID_ARGUMENT"];

/// What happened to one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub success_count: u32,
    pub failure_count: u32,
    /// Tokens the provider classified as unknown or malformed; the caller
    /// deletes the owning devices.
    pub invalid_tokens: Vec<String>,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The whole chunk failed before any token could be attempted.
    #[error("delivery transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait PushDelivery: Send + Sync {
    /// Sends one notification to up to [`FCM_BATCH_LIMIT`] tokens.
    ///
    /// # Errors
    ///
    /// A transport-level error means no token in the chunk was attempted;
    /// per-token failures are reported in the [`BatchOutcome`] instead.
    async fn send_batch(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> Result<BatchOutcome, DeliveryError>;
}

/// FCM HTTP v1 client.
///
/// The v1 API takes one message per request; a batch is a chunk-sized run of
/// sends sharing a single OAuth token. Per-token rejections are classified
/// into the invalid set; request-level network hiccups count the token as
/// failed and move on.
pub struct FcmDelivery {
    http: reqwest::Client,
    project_id: String,
    token_provider: Arc<dyn TokenProvider>,
}

impl FcmDelivery {
    /// Builds a client using ambient Google credentials
    /// (`GOOGLE_APPLICATION_CREDENTIALS` or the workload identity).
    ///
    /// # Errors
    ///
    /// Fails when no usable credentials are found.
    pub async fn new(project_id: impl Into<String>) -> Result<Self, DeliveryError> {
        let token_provider = gcp_auth::provider()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self::with_provider(project_id, token_provider))
    }

    /// Builds a client from an explicit service-account key file.
    ///
    /// # Errors
    ///
    /// Fails when the key file cannot be read or is not a service account.
    pub fn with_credentials_file(
        project_id: impl Into<String>,
        credentials_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, DeliveryError> {
        let account = gcp_auth::CustomServiceAccount::from_file(credentials_path)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self::with_provider(project_id, Arc::new(account)))
    }

    fn with_provider(
        project_id: impl Into<String>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            project_id: project_id.into(),
            token_provider,
        }
    }

    fn send_url(&self) -> String {
        format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.project_id
        )
    }
}

#[async_trait]
impl PushDelivery for FcmDelivery {
    async fn send_batch(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> Result<BatchOutcome, DeliveryError> {
        // Without a bearer token nothing in the chunk can be attempted.
        let auth = self
            .token_provider
            .token(FCM_SCOPE)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let url = self.send_url();
        let mut outcome = BatchOutcome::default();

        for token in tokens {
            let payload = json!({
                "message": {
                    "token": token,
                    "notification": { "title": title, "body": body },
                    "data": data,
                }
            });
            let response = self
                .http
                .post(&url)
                .bearer_auth(auth.as_str())
                .json(&payload)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    outcome.success_count += 1;
                }
                Ok(response) => {
                    outcome.failure_count += 1;
                    let text = response.text().await.unwrap_or_default();
                    if INVALID_TOKEN_CODES.iter().any(|code| text.contains(code)) {
                        outcome.invalid_tokens.push(token.clone());
                    }
                }
                Err(error) => {
                    outcome.failure_count += 1;
                    warn!(%error, "push send failed at the transport level");
                }
            }
        }
        Ok(outcome)
    }
}

/// Stand-in for deployments with no delivery credentials configured.
///
/// Every chunk errors, so the pipeline records each recipient as failed
/// rather than silently pretending to deliver.
pub struct NoopDelivery;

#[async_trait]
impl PushDelivery for NoopDelivery {
    async fn send_batch(
        &self,
        tokens: &[String],
        _title: &str,
        _body: &str,
        _data: &HashMap<String, String>,
    ) -> Result<BatchOutcome, DeliveryError> {
        warn!(
            tokens = tokens.len(),
            "push delivery is not configured; dropping batch"
        );
        Err(DeliveryError::Transport(
            "push delivery not configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_delivery_fails_the_chunk() {
        let result = NoopDelivery
            .send_batch(
                &["token-1".to_string()],
                "title",
                "body",
                &HashMap::new(),
            )
            .await;
        assert!(matches!(result, Err(DeliveryError::Transport(_))));
    }
}
