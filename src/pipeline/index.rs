// DANS : src/pipeline/index.rs

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::pipeline::{ConfigError, Pipeline};
use crate::programs::ProgramId;

/// Index programme -> pipelines. Les lectures dominent largement; les
/// écritures viennent du plan de contrôle. Un lecteur voit toujours un
/// instantané cohérent : soit l'ancienne version du pipeline, soit la
/// nouvelle, jamais un état à moitié indexé.
pub struct PipelineIndex {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    pipelines: HashMap<String, Arc<Pipeline>>,
    by_program: HashMap<ProgramId, Vec<String>>,
}

impl Inner {
    fn unindex(&mut self, pipeline: &Pipeline) {
        for program in &pipeline.programs {
            if let Some(bucket) = self.by_program.get_mut(program) {
                bucket.retain(|id| id != &pipeline.id);
                if bucket.is_empty() {
                    self.by_program.remove(program);
                }
            }
        }
    }

    fn index(&mut self, pipeline: &Pipeline) {
        for program in &pipeline.programs {
            self.by_program
                .entry(*program)
                .or_default()
                .push(pipeline.id.clone());
        }
    }
}

impl PipelineIndex {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }

    /// Remplace ou ajoute un pipeline. L'ancienne version est désindexée
    /// avant que la nouvelle ne soit stockée, sous le même verrou.
    pub fn upsert(&self, pipeline: Pipeline) -> Result<(), ConfigError> {
        pipeline.validate()?;
        let mut inner = self.inner.write().expect("verrou index empoisonné");
        if let Some(previous) = inner.pipelines.remove(&pipeline.id) {
            inner.unindex(&previous);
        }
        inner.index(&pipeline);
        info!("[Index] Pipeline {} indexé ({} programmes)", pipeline.id, pipeline.programs.len());
        inner.pipelines.insert(pipeline.id.clone(), Arc::new(pipeline));
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Pipeline>> {
        let mut inner = self.inner.write().expect("verrou index empoisonné");
        let removed = inner.pipelines.remove(id)?;
        inner.unindex(&removed);
        info!("[Index] Pipeline {} retiré", id);
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Pipeline>> {
        self.inner.read().expect("verrou index empoisonné").pipelines.get(id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<Pipeline>> {
        self.inner
            .read()
            .expect("verrou index empoisonné")
            .pipelines
            .values()
            .cloned()
            .collect()
    }

    /// Pipelines actifs enregistrés pour ce programme. L'ordre n'est pas
    /// spécifié mais stable pour un appel donné.
    pub fn pipelines_for(&self, program: ProgramId) -> Vec<Arc<Pipeline>> {
        let inner = self.inner.read().expect("verrou index empoisonné");
        let Some(bucket) = inner.by_program.get(&program) else {
            return Vec::new();
        };
        bucket
            .iter()
            .filter_map(|id| inner.pipelines.get(id))
            .filter(|pipeline| pipeline.is_active())
            .cloned()
            .collect()
    }
}

impl Default for PipelineIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::pipeline;
    use crate::pipeline::PipelineStatus;

    #[test]
    fn upsert_then_lookup_by_every_program() {
        let index = PipelineIndex::new();
        index
            .upsert(pipeline("p1", vec![ProgramId::PumpFun, ProgramId::PumpAmm]))
            .unwrap();

        assert_eq!(index.pipelines_for(ProgramId::PumpFun).len(), 1);
        assert_eq!(index.pipelines_for(ProgramId::PumpAmm).len(), 1);
        assert!(index.pipelines_for(ProgramId::RaydiumCpmm).is_empty());
    }

    #[test]
    fn reupsert_leaves_no_stale_entries() {
        let index = PipelineIndex::new();
        index
            .upsert(pipeline("p1", vec![ProgramId::PumpFun, ProgramId::PumpAmm]))
            .unwrap();
        // La nouvelle version ne cible plus pump_amm.
        index.upsert(pipeline("p1", vec![ProgramId::PumpFun])).unwrap();

        assert_eq!(index.pipelines_for(ProgramId::PumpFun).len(), 1);
        assert!(index.pipelines_for(ProgramId::PumpAmm).is_empty());
    }

    #[test]
    fn remove_drops_reverse_mappings() {
        let index = PipelineIndex::new();
        index.upsert(pipeline("p1", vec![ProgramId::MeteoraDbc])).unwrap();
        index.upsert(pipeline("p2", vec![ProgramId::MeteoraDbc])).unwrap();
        index.remove("p1");

        let remaining = index.pipelines_for(ProgramId::MeteoraDbc);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "p2");
        assert!(index.get("p1").is_none());
    }

    #[test]
    fn paused_pipelines_are_invisible_to_readers() {
        let index = PipelineIndex::new();
        let mut paused = pipeline("p1", vec![ProgramId::PumpFun]);
        paused.status = PipelineStatus::Paused;
        index.upsert(paused).unwrap();

        assert!(index.pipelines_for(ProgramId::PumpFun).is_empty());
        // Le pipeline existe toujours pour le plan de contrôle.
        assert!(index.get("p1").is_some());
    }

    #[test]
    fn invalid_upsert_is_rejected_and_not_indexed() {
        let index = PipelineIndex::new();
        assert!(index.upsert(pipeline("p1", vec![])).is_err());
        assert!(index.get("p1").is_none());
    }
}
