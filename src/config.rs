// DANS : src/config.rs

use anyhow::Result;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub geyser_grpc_url: String,

    // Serveurs locaux
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default = "default_realtime_port")]
    pub realtime_port: u16,

    // Livraison sortante
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_webhook_attempts")]
    pub default_webhook_attempts: u8,

    // Bus temps réel
    #[serde(default = "default_realtime_room_capacity")]
    pub realtime_room_capacity: usize,
}

// --- Fonctions de valeur par défaut ---

fn default_metrics_port() -> u16 { 9100 }
fn default_realtime_port() -> u16 { 8900 }
fn default_http_timeout_secs() -> u64 { 10 }
fn default_webhook_attempts() -> u8 { 3 }
fn default_realtime_room_capacity() -> usize { 256 }

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()?;
        Ok(config)
    }
}
