// DANS : src/delivery/discord.rs

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::delivery::DeliveryError;
use crate::events::OutputRecord;

fn default_true() -> bool {
    true
}

const COLOR_BUY: u32 = 0x2ecc71;
const COLOR_SELL: u32 = 0xe74c3c;
const COLOR_NEUTRAL: u32 = 0x3498db;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub webhook_url: String,
    /// Embed riche par défaut, texte brut sinon.
    #[serde(default = "default_true")]
    pub use_embeds: bool,
}

fn field(name: &str, value: String) -> Value {
    json!({ "name": name, "value": value, "inline": true })
}

fn data_str(output: &OutputRecord, key: &str) -> Option<String> {
    match output.data.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Construit le message selon la forme du record : trade, migration, ou
/// repli générique sur un bloc JSON.
pub fn build_message(output: &OutputRecord, use_embeds: bool) -> Value {
    if !use_embeds {
        let rendered = serde_json::to_string_pretty(&output.data).unwrap_or_default();
        let mut content = format!("```json\n{}\n```", rendered);
        // Limite Discord : 2000 caractères par message.
        content.truncate(1990);
        return json!({ "content": content });
    }

    match output.data.get("type").and_then(|v| v.as_str()) {
        Some("trade") => {
            let direction = data_str(output, "direction").unwrap_or_else(|| "swap".into());
            let color = match direction.as_str() {
                "buy" => COLOR_BUY,
                "sell" => COLOR_SELL,
                _ => COLOR_NEUTRAL,
            };
            let mut fields = vec![];
            if let Some(token) = data_str(output, "token") {
                fields.push(field("Token", token));
            }
            if let Some(sol) = data_str(output, "solAmount") {
                fields.push(field("SOL", sol));
            }
            if let Some(tokens) = data_str(output, "tokenAmount") {
                fields.push(field("Tokens", tokens));
            }
            if let Some(trader) = data_str(output, "trader") {
                fields.push(field("Trader", trader));
            }
            json!({
                "embeds": [{
                    "title": format!("{} — {}", direction.to_uppercase(), output.program.as_str()),
                    "color": color,
                    "fields": fields,
                    "footer": { "text": output.signature },
                }]
            })
        }
        Some("migration") => {
            let mut fields = vec![];
            if let Some(token) = data_str(output, "token") {
                fields.push(field("Token", token));
            }
            if let Some(pool) = data_str(output, "pool") {
                fields.push(field("Pool", pool));
            }
            if let Some(raised) = data_str(output, "solRaised") {
                fields.push(field("SOL levés", raised));
            }
            json!({
                "embeds": [{
                    "title": format!("Migration — {}", output.program.as_str()),
                    "color": COLOR_NEUTRAL,
                    "fields": fields,
                    "footer": { "text": output.signature },
                }]
            })
        }
        _ => {
            let rendered = serde_json::to_string_pretty(&output.data).unwrap_or_default();
            let mut description = format!("```json\n{}\n```", rendered);
            description.truncate(1990);
            json!({
                "embeds": [{
                    "title": format!("Événement — {}", output.program.as_str()),
                    "color": COLOR_NEUTRAL,
                    "description": description,
                    "footer": { "text": output.signature },
                }]
            })
        }
    }
}

/// POST du message sur le webhook. Succès = 2xx, pas de retry.
pub async fn send(
    client: &reqwest::Client,
    config: &DiscordConfig,
    output: &OutputRecord,
) -> Result<(), DeliveryError> {
    let message = build_message(output, config.use_embeds);
    super::post_json(client, &config.webhook_url, &message).await
}
