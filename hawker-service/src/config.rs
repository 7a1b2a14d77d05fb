//! Service configuration. Every knob is a flag with an environment-variable
//! twin, so containers configure via env and operators via CLI.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Port the push ingest endpoint listens on.
    #[arg(env = "HTTP_PORT", long, default_value_t = 8080)]
    pub http_port: u16,

    /// Deployment environment. Anything other than "development" enforces
    /// push authentication on the managed transport.
    #[arg(env = "ENVIRONMENT", long, default_value = "development")]
    pub environment: String,

    /// Messaging transport: "google", "local", or empty for none.
    #[arg(env = "PUBSUB_PROVIDER", long, default_value = "")]
    pub pubsub_provider: String,

    #[arg(env = "PUBSUB_PROJECT_ID", long, default_value = "")]
    pub pubsub_project_id: String,

    #[arg(env = "PUBSUB_TOPIC_ID", long, default_value = "")]
    pub pubsub_topic_id: String,

    /// Where the loopback publisher posts envelopes; normally this
    /// service's own /push URL.
    #[arg(env = "PUBSUB_LOCAL_ENDPOINT", long, default_value = "")]
    pub pubsub_local_endpoint: String,

    /// Public URL of this endpoint; the required audience of inbound
    /// identity tokens.
    #[arg(env = "PUSH_ENDPOINT_URL", long, default_value = "")]
    pub push_endpoint_url: String,

    /// Enables road-network routing. Disabled, the radius filter runs on
    /// great-circle estimates only.
    #[arg(env = "PMTILES_ENABLED", long, default_value_t = false)]
    pub pmtiles_enabled: bool,

    /// Tile archive URL (file://, http(s)://, s3://, or gs://).
    #[arg(env = "PMTILES_SOURCE", long, default_value = "")]
    pub pmtiles_source: String,

    #[arg(env = "PMTILES_ROAD_LAYER", long, default_value = "transportation")]
    pub pmtiles_road_layer: String,

    #[arg(env = "PMTILES_ZOOM_LEVEL", long, default_value_t = 14)]
    pub pmtiles_zoom_level: u8,

    /// Firebase project for push delivery. Empty means no delivery client:
    /// campaigns run but every push is recorded as failed.
    #[arg(env = "FIREBASE_PROJECT_ID", long, default_value = "")]
    pub firebase_project_id: String,

    /// Service-account key file for push delivery. Empty falls back to
    /// ambient discovery (GOOGLE_APPLICATION_CREDENTIALS, workload
    /// identity).
    #[arg(env = "FIREBASE_CREDENTIALS", long, default_value = "")]
    pub firebase_credentials: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubsubProvider {
    Google,
    Local,
    None,
}

impl Config {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn pubsub(&self) -> PubsubProvider {
        match self.pubsub_provider.as_str() {
            "google" => PubsubProvider::Google,
            "local" => PubsubProvider::Local,
            _ => PubsubProvider::None,
        }
    }
}
