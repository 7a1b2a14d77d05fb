//! HTTP surface: the push ingest endpoint, a liveness probe, and a local
//! publish hook for exercising the transport loop end to end.

use crate::auth::PushAuthenticator;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use hawker_fanout::event::REQUEST_ID_HEADER;
use hawker_fanout::{EventPublisher, FanoutPipeline, NotificationEvent, PushEnvelope};
use std::sync::Arc;
use tracing::{Instrument, info_span, warn};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<FanoutPipeline>,
    pub publisher: Arc<dyn EventPublisher>,
    /// Present only in production with the managed transport.
    pub authenticator: Option<Arc<PushAuthenticator>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/push", post(receive_push))
        .route("/publish", post(publish_event))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// The pub/sub push endpoint.
///
/// The response status is the retry contract: 200 means done (including
/// give-ups that redelivery cannot fix), 400 means the envelope itself is
/// malformed, 401 means the delivery failed authentication, and 503 asks the
/// transport to redeliver.
async fn receive_push(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    if let Some(authenticator) = &state.authenticator {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        let Some(token) = bearer else {
            warn!("push request without bearer token");
            return StatusCode::UNAUTHORIZED;
        };
        if let Err(error) = authenticator.verify(token).await {
            warn!(%error, "push request failed authentication");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let envelope: PushEnvelope = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(%error, "push body is not a provider envelope");
            return StatusCode::BAD_REQUEST;
        }
    };
    let event = match envelope.decode_event() {
        Ok(event) => event,
        Err(error) => {
            warn!(%error, "enveloped message is not a notification event");
            return StatusCode::BAD_REQUEST;
        }
    };

    let header_request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok());
    let request_id = envelope.resolve_request_id(&event, header_request_id);
    let span = info_span!(
        "campaign",
        %request_id,
        notification_id = %event.notification_id
    );

    match state.pipeline.process(&event).instrument(span).await {
        Ok(_) => StatusCode::OK,
        Err(error) if error.is_retryable() => {
            warn!(%error, "campaign failed on a retryable step; requesting redelivery");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(error) => {
            // Redelivering a malformed event cannot help; swallow it.
            warn!(%error, "giving up on campaign");
            StatusCode::OK
        }
    }
}

/// Local convenience: hand an event to the configured publisher. With the
/// loopback transport this drives the full envelope round trip against the
/// endpoint above.
async fn publish_event(State(state): State<AppState>, body: String) -> StatusCode {
    let event: NotificationEvent = match serde_json::from_str(&body) {
        Ok(event) => event,
        Err(error) => {
            warn!(%error, "publish body is not a notification event");
            return StatusCode::BAD_REQUEST;
        }
    };
    match state.publisher.publish(&event).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(error) => {
            warn!(%error, "failed to publish event");
            StatusCode::BAD_GATEWAY
        }
    }
}
