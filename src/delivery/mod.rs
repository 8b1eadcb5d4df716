// DANS : src/delivery/mod.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::events::OutputRecord;
use crate::monitoring::metrics::DELIVERY_OUTCOMES;
use crate::pipeline::Destinations;

pub mod discord;
pub mod realtime;
pub mod telegram;
pub mod webhook;

use realtime::RealtimeBus;

/// Erreurs de livraison, par tentative.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Réponse 4xx : la destination refuse, inutile de réessayer.
    #[error("réponse {0}, non réessayable")]
    Rejected(u16),
    /// Réponse non-2xx réessayable (5xx).
    #[error("réponse {0}")]
    Status(u16),
    #[error("transport : {0}")]
    Transport(String),
    #[error("bus temps réel non initialisé")]
    BusUnavailable,
}

/// Classement commun des réponses HTTP : 2xx succès, 4xx refus définitif
/// (non réessayable), le reste réessayable.
pub(crate) fn classify_status(status: reqwest::StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        Ok(())
    } else if status.is_client_error() {
        Err(DeliveryError::Rejected(status.as_u16()))
    } else {
        Err(DeliveryError::Status(status.as_u16()))
    }
}

/// POST JSON sans retry, le contrat partagé des destinations de type chat.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
) -> Result<(), DeliveryError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| DeliveryError::Transport(e.to_string()))?;
    classify_status(response.status())
}

/// Résultat par destination. L'échec d'une destination ne bloque jamais
/// les autres.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub destination: &'static str,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryResult {
    fn success(destination: &'static str) -> Self {
        Self { destination, success: true, error: None }
    }

    fn failure(destination: &'static str, error: DeliveryError) -> Self {
        Self { destination, success: false, error: Some(error.to_string()) }
    }
}

/// Une destination capable de consommer un enregistrement de sortie.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    fn tag(&self) -> &'static str;
    async fn send(&self, output: &OutputRecord) -> Result<(), DeliveryError>;
}

// --- SINKS CONCRETS ---

struct DiscordSink {
    client: reqwest::Client,
    config: discord::DiscordConfig,
}

#[async_trait]
impl DeliverySink for DiscordSink {
    fn tag(&self) -> &'static str {
        "discord"
    }
    async fn send(&self, output: &OutputRecord) -> Result<(), DeliveryError> {
        discord::send(&self.client, &self.config, output).await
    }
}

struct TelegramSink {
    client: reqwest::Client,
    config: telegram::TelegramConfig,
}

#[async_trait]
impl DeliverySink for TelegramSink {
    fn tag(&self) -> &'static str {
        "telegram"
    }
    async fn send(&self, output: &OutputRecord) -> Result<(), DeliveryError> {
        telegram::send(&self.client, &self.config, output).await
    }
}

struct WebhookSink {
    client: reqwest::Client,
    config: webhook::WebhookConfig,
}

#[async_trait]
impl DeliverySink for WebhookSink {
    fn tag(&self) -> &'static str {
        "webhook"
    }
    async fn send(&self, output: &OutputRecord) -> Result<(), DeliveryError> {
        webhook::send(&self.client, &self.config, output).await
    }
}

struct RealtimeSink {
    bus: Option<Arc<RealtimeBus>>,
}

#[async_trait]
impl DeliverySink for RealtimeSink {
    fn tag(&self) -> &'static str {
        "realtime"
    }
    async fn send(&self, output: &OutputRecord) -> Result<(), DeliveryError> {
        let bus = self.bus.as_ref().ok_or(DeliveryError::BusUnavailable)?;
        let reached = bus.publish(output);
        debug!("[Dispatcher] Diffusion temps réel vers {} abonnés", reached);
        Ok(())
    }
}

// --- DISPATCHER ---

/// Route chaque enregistrement vers toutes les destinations activées du
/// pipeline, en parallèle, avec isolation des échecs.
pub struct Dispatcher {
    http: reqwest::Client,
    bus: Option<Arc<RealtimeBus>>,
}

impl Dispatcher {
    pub fn new(http_timeout: Duration, bus: Option<Arc<RealtimeBus>>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .expect("construction du client HTTP");
        Self { http, bus }
    }

    fn sinks_for(&self, destinations: &Destinations) -> Vec<Box<dyn DeliverySink>> {
        let mut sinks: Vec<Box<dyn DeliverySink>> = Vec::new();
        if let Some(config) = &destinations.discord {
            if config.enabled {
                sinks.push(Box::new(DiscordSink { client: self.http.clone(), config: config.clone() }));
            }
        }
        if let Some(config) = &destinations.telegram {
            if config.enabled {
                sinks.push(Box::new(TelegramSink { client: self.http.clone(), config: config.clone() }));
            }
        }
        if let Some(config) = &destinations.webhook {
            if config.enabled {
                sinks.push(Box::new(WebhookSink { client: self.http.clone(), config: config.clone() }));
            }
        }
        if let Some(config) = &destinations.realtime {
            if config.enabled {
                sinks.push(Box::new(RealtimeSink { bus: self.bus.clone() }));
            }
        }
        sinks
    }

    pub async fn deliver(
        &self,
        output: &OutputRecord,
        destinations: &Destinations,
    ) -> Vec<DeliveryResult> {
        let sinks = self.sinks_for(destinations);
        let sends = sinks.iter().map(|sink| async {
            let tag = sink.tag();
            match sink.send(output).await {
                Ok(()) => DeliveryResult::success(tag),
                Err(e) => DeliveryResult::failure(tag, e),
            }
        });

        let results = join_all(sends).await;
        for result in &results {
            let status = if result.success { "success" } else { "failure" };
            DELIVERY_OUTCOMES
                .with_label_values(&[result.destination, status])
                .inc();
        }
        results
    }
}
