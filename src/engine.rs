// DANS : src/engine.rs

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::decoders::DecoderRegistry;
use crate::delivery::Dispatcher;
use crate::envelope::TransactionEnvelope;
use crate::events::Event;
use crate::monitoring::metrics::{
    EVENTS_DECODED, EVENTS_FILTERED, EVENTS_MATCHED, PIPELINE_ERRORS, TRANSACTIONS_RECEIVED,
};
use crate::pipeline::index::PipelineIndex;
use crate::pipeline::{transform, ConfigError, Pipeline};

/// Orchestrateur de bout en bout : décodage, appariement, filtre,
/// transformation, livraison. Possède l'index et y injecte les références,
/// jamais de singleton.
pub struct PipelineEngine {
    registry: DecoderRegistry,
    index: Arc<PipelineIndex>,
    dispatcher: Dispatcher,
}

impl PipelineEngine {
    pub fn new(registry: DecoderRegistry, index: Arc<PipelineIndex>, dispatcher: Dispatcher) -> Self {
        Self { registry, index, dispatcher }
    }

    // --- SURFACE PLAN DE CONTRÔLE ---

    pub fn upsert_pipeline(&self, pipeline: Pipeline) -> Result<(), ConfigError> {
        self.index.upsert(pipeline)
    }

    pub fn remove_pipeline(&self, id: &str) {
        self.index.remove(id);
    }

    pub fn get_pipeline(&self, id: &str) -> Option<Arc<Pipeline>> {
        self.index.get(id)
    }

    pub fn list_pipelines(&self) -> Vec<Arc<Pipeline>> {
        self.index.list()
    }

    pub fn pipelines_for_program(&self, program: crate::programs::ProgramId) -> Vec<Arc<Pipeline>> {
        self.index.pipelines_for(program)
    }

    // --- FLOT PRINCIPAL ---

    /// Traite une enveloppe : décode, puis pour chaque événement, déroule
    /// chaque pipeline apparié. Les pipelines d'un même événement s'exécutent
    /// en parallèle; aucun échec ne se propage au-delà de son pipeline.
    pub async fn process_transaction(&self, envelope: &TransactionEnvelope) {
        TRANSACTIONS_RECEIVED.inc();
        let events = self.registry.parse(envelope);
        for event in events {
            EVENTS_DECODED.inc();
            let pipelines = self.index.pipelines_for(event.program);
            if pipelines.is_empty() {
                continue;
            }
            debug!("[Engine] Événement {} apparié à {} pipeline(s)", event.id, pipelines.len());
            let runs = pipelines.iter().map(|pipeline| self.run_pipeline(pipeline, &event));
            join_all(runs).await;
        }
    }

    async fn run_pipeline(&self, pipeline: &Arc<Pipeline>, event: &Event) {
        if !pipeline.filter.evaluate(event) {
            EVENTS_FILTERED.inc();
            return;
        }
        EVENTS_MATCHED.inc();

        let output = transform::apply(&pipeline.transform, event, &pipeline.id);
        let results = self.dispatcher.deliver(&output, &pipeline.destinations).await;
        for result in results {
            if !result.success {
                PIPELINE_ERRORS.with_label_values(&[pipeline.id.as_str()]).inc();
                warn!(
                    "[Engine] Livraison {} en échec pour le pipeline {} : {}",
                    result.destination,
                    pipeline.id,
                    result.error.unwrap_or_default()
                );
            }
        }
    }
}
