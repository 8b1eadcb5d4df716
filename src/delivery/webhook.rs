// DANS : src/delivery/webhook.rs

use std::collections::HashMap;
use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::delivery::DeliveryError;
use crate::events::{EventData, OutputRecord};

type HmacSha256 = Hmac<Sha256>;

pub const USER_AGENT: &str = "tada-dispatch/0.1";
pub const DEFAULT_SIGNATURE_HEADER: &str = "X-Tada-Signature";

fn default_true() -> bool {
    true
}
fn default_attempts() -> u8 {
    3
}
fn default_signature_header() -> String {
    DEFAULT_SIGNATURE_HEADER.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Linear,
    Exponential,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Linear
    }
}

impl Backoff {
    /// Délai après le k-ième échec : linéaire `k × 1000ms`,
    /// exponentiel `2^(k−1) × 1000ms`.
    pub fn delay(&self, attempt: u8) -> Duration {
        let millis = match self {
            Backoff::Linear => attempt as u64 * 1000,
            // Exposant plafonné : au-delà, le délai n'a plus de sens.
            Backoff::Exponential => 1000u64 << u64::from(attempt.saturating_sub(1).min(20)),
        };
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub url: String,
    /// En-têtes fournis par l'appelant, fusionnés avec les nôtres.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Secret de signature HMAC-SHA256 du corps sérialisé.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
    #[serde(default = "default_attempts")]
    pub attempts: u8,
    #[serde(default)]
    pub backoff: Backoff,
}

/// Signature du corps : HMAC-SHA256 hexadécimal minuscule, préfixé `sha256=`.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepte toute longueur de clé");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Corps envoyé : les champs de `data`, plus un bloc `_meta` d'identité.
pub fn webhook_body(output: &OutputRecord) -> Vec<u8> {
    let mut body = EventData::new();
    for (key, value) in &output.data {
        body.insert(key.clone(), value.clone());
    }
    let mut meta = EventData::new();
    meta.insert("pipelineId".to_string(), Value::String(output.pipeline_id.clone()));
    meta.insert("eventId".to_string(), Value::String(output.id.clone()));
    meta.insert("timestamp".to_string(), Value::from(output.timestamp));
    body.insert("_meta".to_string(), Value::Object(meta));
    serde_json::to_vec(&Value::Object(body)).unwrap_or_default()
}

/// Envoie l'enregistrement avec le budget de tentatives configuré.
/// 4xx : échec non réessayable, abandon immédiat. 5xx ou erreur de
/// transport : pause puis nouvel essai jusqu'à épuisement du budget.
pub async fn send(
    client: &reqwest::Client,
    config: &WebhookConfig,
    output: &OutputRecord,
) -> Result<(), DeliveryError> {
    let body = webhook_body(output);
    let attempts = config.attempts.max(1);

    for attempt in 1..=attempts {
        let mut request = client
            .post(&config.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT)
            .header("X-Tada-Pipeline-Id", &output.pipeline_id)
            .header("X-Tada-Event-Id", &output.id)
            .header("X-Tada-Timestamp", output.timestamp.to_string());
        for (name, value) in &config.headers {
            request = request.header(name, value);
        }
        if let Some(secret) = &config.secret {
            request = request.header(&config.signature_header, sign_payload(secret, &body));
        }

        let outcome = request.body(body.clone()).send().await;
        let error = match outcome {
            Ok(response) => match super::classify_status(response.status()) {
                Ok(()) => return Ok(()),
                // 4xx : inutile de réessayer.
                Err(rejected @ DeliveryError::Rejected(_)) => return Err(rejected),
                Err(retryable) => retryable,
            },
            Err(e) => DeliveryError::Transport(e.to_string()),
        };

        if attempt == attempts {
            warn!("[Webhook] Budget épuisé après {} tentatives sur {}", attempts, config.url);
            return Err(error);
        }
        let delay = config.backoff.delay(attempt);
        debug!("[Webhook] Tentative {} échouée ({}), pause de {:?}", attempt, error, delay);
        sleep(delay).await;
    }
    unreachable!()
}
