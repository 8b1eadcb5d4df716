// DANS : src/monitoring/metrics.rs

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};
use warp::Filter;

lazy_static! {
    // --- Flux & Décodage ---
    pub static ref TRANSACTIONS_RECEIVED: IntCounter = register_int_counter!(
        "tada_transactions_received_total", "Nombre total d'enveloppes de transaction reçues du flux"
    ).unwrap();
    pub static ref EVENTS_DECODED: IntCounter = register_int_counter!(
        "tada_events_decoded_total", "Nombre total d'événements produits par les décodeurs"
    ).unwrap();
    pub static ref DECODER_ERRORS: IntCounterVec = register_int_counter_vec!(
        "tada_decoder_errors_total",
        "Erreurs de décodage confinées, par programme",
        &["program"]
    ).unwrap();

    // --- Pipelines ---
    pub static ref EVENTS_MATCHED: IntCounter = register_int_counter!(
        "tada_events_matched_total", "Événements ayant passé le filtre d'un pipeline"
    ).unwrap();
    pub static ref EVENTS_FILTERED: IntCounter = register_int_counter!(
        "tada_events_filtered_total", "Événements rejetés par le filtre d'un pipeline"
    ).unwrap();
    pub static ref PIPELINE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "tada_pipeline_errors_total",
        "Erreurs confinées au traitement d'un pipeline",
        &["pipeline"]
    ).unwrap();

    // --- Livraison ---
    pub static ref DELIVERY_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "tada_delivery_outcomes_total",
        "Résultats de livraison, par destination et statut",
        &["destination", "status"] // Labels : "webhook", "success" / "failure"
    ).unwrap();
    pub static ref REALTIME_SUBSCRIBERS: IntGauge = register_int_gauge!(
        "tada_realtime_subscribers", "Nombre d'abonnés temps réel connectés"
    ).unwrap();
}

pub async fn start_metrics_server(port: u16) {
    let metrics_route = warp::path!("metrics").map(|| {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        encoder.encode(&prometheus::gather(), &mut buffer).unwrap();
        warp::reply::with_header(buffer, "content-type", "text/plain; version=0.0.4")
    });
    tracing::info!("[Monitoring] Serveur de métriques exposé sur http://0.0.0.0:{}/metrics", port);
    warp::serve(metrics_route).run(([0, 0, 0, 0], port)).await;
}
