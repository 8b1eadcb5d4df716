// DANS : src/pipeline/mod.rs

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::delivery::discord::DiscordConfig;
use crate::delivery::realtime::RealtimeConfig;
use crate::delivery::telegram::TelegramConfig;
use crate::delivery::webhook::WebhookConfig;
use crate::programs::ProgramId;

pub mod filter;
pub mod index;
pub mod transform;

pub use filter::Filter;
pub use transform::Transform;

/// Erreurs de configuration rejetées au moment de l'upsert et remontées
/// au plan de contrôle.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("le pipeline {0} ne cible aucun programme")]
    EmptyPrograms(String),
    #[error("le pipeline {0} n'a aucune destination activée")]
    NoEnabledDestination(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Active,
    Paused,
    Error,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        PipelineStatus::Active
    }
}

/// Ensemble des destinations d'un pipeline. Chaque variante porte sa propre
/// configuration (identifiants, URL, préférences de format, retry, secret).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Destinations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<DiscordConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime: Option<RealtimeConfig>,
}

impl Destinations {
    pub fn enabled_count(&self) -> usize {
        let mut count = 0;
        if self.discord.as_ref().map_or(false, |d| d.enabled) {
            count += 1;
        }
        if self.telegram.as_ref().map_or(false, |t| t.enabled) {
            count += 1;
        }
        if self.webhook.as_ref().map_or(false, |w| w.enabled) {
            count += 1;
        }
        if self.realtime.as_ref().map_or(false, |r| r.enabled) {
            count += 1;
        }
        count
    }
}

/// Un pipeline défini par l'utilisateur : programmes ciblés, filtre,
/// transformation et destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    /// Clé API propriétaire; portée opaque, jamais interprétée ici.
    pub api_key: String,
    pub programs: Vec<ProgramId>,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub transform: Transform,
    pub destinations: Destinations,
    #[serde(default)]
    pub status: PipelineStatus,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Pipeline {
    /// Invariants vérifiés à l'upsert : au moins un programme, au moins une
    /// destination activée.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.programs.is_empty() {
            return Err(ConfigError::EmptyPrograms(self.id.clone()));
        }
        if self.destinations.enabled_count() == 0 {
            return Err(ConfigError::NoEnabledDestination(self.id.clone()));
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == PipelineStatus::Active
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Pipeline minimal valide pour les tests : realtime seule destination.
    pub fn pipeline(id: &str, programs: Vec<ProgramId>) -> Pipeline {
        Pipeline {
            id: id.to_string(),
            name: format!("pipeline {}", id),
            api_key: "key".to_string(),
            programs,
            filter: Filter::default(),
            transform: Transform::default(),
            destinations: Destinations {
                realtime: Some(RealtimeConfig { enabled: true }),
                ..Default::default()
            },
            status: PipelineStatus::Active,
            created_at: 0,
            updated_at: 0,
        }
    }
}
