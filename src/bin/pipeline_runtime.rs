use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use tada::config::Config;
use tada::decoders::DecoderRegistry;
use tada::delivery::realtime::{serve_realtime, RealtimeBus};
use tada::delivery::Dispatcher;
use tada::engine::PipelineEngine;
use tada::monitoring;
use tada::pipeline::index::PipelineIndex;
use tada::stream;

#[tokio::main]
async fn main() -> Result<()> {
    monitoring::logging::setup_logging();
    let config = Config::load()?;
    info!("[Runtime] Démarrage du runtime de pipelines d'événements.");

    // Ordre de démarrage : catalogue et décodeurs, bus temps réel,
    // pipelines initiaux (plan de contrôle externe), puis le flux.
    let registry = DecoderRegistry::with_catalog();
    let index = Arc::new(PipelineIndex::new());
    let bus = Arc::new(RealtimeBus::new(config.realtime_room_capacity));
    let dispatcher = Dispatcher::new(
        Duration::from_secs(config.http_timeout_secs),
        Some(bus.clone()),
    );
    let engine = Arc::new(PipelineEngine::new(registry, index, dispatcher));

    tokio::spawn(monitoring::metrics::start_metrics_server(config.metrics_port));
    tokio::spawn(serve_realtime(bus, config.realtime_port));

    stream::run(engine, &config).await;
    Ok(())
}
