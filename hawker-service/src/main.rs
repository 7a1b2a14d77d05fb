#![doc = include_str!("../README.md")]

use anyhow::Context;
use clap::Parser;
use hawker_fanout::delivery::{FcmDelivery, NoopDelivery, PushDelivery};
use hawker_fanout::memory::MemoryStore;
use hawker_fanout::pipeline::RoadDistance;
use hawker_fanout::publish::{LoopbackPublisher, NoopPublisher, PubsubPublisher};
use hawker_fanout::{EventPublisher, FanoutPipeline};
use hawker_roadgraph::{GraphCache, Router, TileSource, TileStore};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

mod auth;
mod config;
mod routes;

use auth::PushAuthenticator;
use config::{Config, PubsubProvider};
use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        // Standard logger, configured via the RUST_LOG env variable
        .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env()))
        .init();

    let router = build_router(&config).await?;
    let delivery = build_delivery(&config).await?;
    let publisher = build_publisher(&config).await?;

    // Persistence contracts. The in-memory reference store keeps the worker
    // self-contained; deployments wire SQL-backed adapters here instead.
    let store = Arc::new(MemoryStore::new());
    info!("using in-memory persistence adapters");

    let pipeline = Arc::new(FanoutPipeline::new(
        router,
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        store as _,
        delivery,
    ));

    let authenticator = if !config.is_development() && config.pubsub() == PubsubProvider::Google {
        info!("push authentication enabled");
        Some(Arc::new(PushAuthenticator::new(
            config.push_endpoint_url.clone(),
        )))
    } else {
        None
    };

    let app = routes::router(AppState {
        pipeline,
        publisher: Arc::clone(&publisher),
        authenticator,
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.http_port))?;
    info!(port = config.http_port, "push ingest endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Runs on every termination path that reaches here; the transport client
    // flushes in-flight publishes before the process exits.
    publisher.close().await;
    info!("shut down cleanly");
    Ok(())
}

async fn build_router(config: &Config) -> anyhow::Result<Arc<dyn RoadDistance>> {
    if !config.pmtiles_enabled {
        info!("road routing disabled; radius filter uses great-circle estimates");
        return Ok(Arc::new(Router::disabled()));
    }

    let source = TileSource::parse(&config.pmtiles_source)
        .context("PMTILES_SOURCE is not a usable archive URL")?;
    let store = TileStore::open(&source)
        .await
        .context("failed to open the tile archive")?;
    info!(
        bucket = %source.bucket,
        tileset = %source.tileset,
        zoom = config.pmtiles_zoom_level,
        "road routing enabled"
    );
    let cache = GraphCache::new(store, config.pmtiles_road_layer.clone());
    Ok(Arc::new(Router::new(
        Arc::new(cache),
        config.pmtiles_zoom_level,
    )))
}

async fn build_delivery(config: &Config) -> anyhow::Result<Arc<dyn PushDelivery>> {
    if config.firebase_project_id.is_empty() {
        warn!("no Firebase project configured; every push will be recorded as failed");
        return Ok(Arc::new(NoopDelivery));
    }
    let delivery = if config.firebase_credentials.is_empty() {
        FcmDelivery::new(&config.firebase_project_id)
            .await
            .context("failed to build the FCM client from ambient credentials")?
    } else {
        FcmDelivery::with_credentials_file(
            &config.firebase_project_id,
            &config.firebase_credentials,
        )
        .context("failed to build the FCM client from FIREBASE_CREDENTIALS")?
    };
    info!(project = %config.firebase_project_id, "push delivery enabled");
    Ok(Arc::new(delivery))
}

async fn build_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    match config.pubsub() {
        PubsubProvider::Google => {
            let publisher =
                PubsubPublisher::new(config.pubsub_project_id.clone(), &config.pubsub_topic_id)
                    .await
                    .context("failed to build the pub/sub publisher")?;
            info!(topic = %config.pubsub_topic_id, "publishing to managed pub/sub");
            Ok(Arc::new(publisher))
        }
        PubsubProvider::Local => {
            let publisher = LoopbackPublisher::new(&config.pubsub_local_endpoint)
                .context("failed to build the loopback publisher")?;
            info!(endpoint = %config.pubsub_local_endpoint, "publishing via local loopback");
            Ok(Arc::new(publisher))
        }
        PubsubProvider::None => {
            info!("no messaging transport configured");
            Ok(Arc::new(NoopPublisher))
        }
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for the shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
