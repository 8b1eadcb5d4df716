// DANS : src/delivery/telegram.rs

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::delivery::DeliveryError;
use crate::events::OutputRecord;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Markdown,
    Html,
    Plain,
}

impl Default for MessageFormat {
    fn default() -> Self {
        MessageFormat::Markdown
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default)]
    pub format: MessageFormat,
}

fn data_str(output: &OutputRecord, key: &str) -> Option<String> {
    match output.data.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Texte du message selon le format demandé.
pub fn format_message(output: &OutputRecord, format: MessageFormat) -> String {
    let lines: Vec<String> = match output.data.get("type").and_then(|v| v.as_str()) {
        Some("trade") => {
            let direction = data_str(output, "direction").unwrap_or_else(|| "swap".into());
            let emoji = match direction.as_str() {
                "buy" => "🟢",
                "sell" => "🔴",
                _ => "🔁",
            };
            let mut lines = vec![format!("{} {} — {}", emoji, direction.to_uppercase(), output.program.as_str())];
            if let Some(token) = data_str(output, "token") {
                lines.push(format!("Token : {}", token));
            }
            if let Some(sol) = data_str(output, "solAmount") {
                lines.push(format!("SOL : {}", sol));
            }
            if let Some(trader) = data_str(output, "trader") {
                lines.push(format!("Trader : {}", trader));
            }
            lines
        }
        Some("migration") => {
            let mut lines = vec![format!("🚀 Migration — {}", output.program.as_str())];
            if let Some(token) = data_str(output, "token") {
                lines.push(format!("Token : {}", token));
            }
            if let Some(raised) = data_str(output, "solRaised") {
                lines.push(format!("SOL levés : {}", raised));
            }
            lines
        }
        _ => vec![
            format!("Événement — {}", output.program.as_str()),
            serde_json::to_string_pretty(&output.data).unwrap_or_default(),
        ],
    };

    let body = lines.join("\n");
    match format {
        MessageFormat::Markdown => format!("{}\n`{}`", body, output.signature),
        MessageFormat::Html => format!("{}\n<code>{}</code>", body, output.signature),
        MessageFormat::Plain => format!("{}\n{}", body, output.signature),
    }
}

/// POST sur l'endpoint `sendMessage` de l'API bot. Succès = 2xx, pas de retry.
pub async fn send(
    client: &reqwest::Client,
    config: &TelegramConfig,
    output: &OutputRecord,
) -> Result<(), DeliveryError> {
    let url = format!("https://api.telegram.org/bot{}/sendMessage", config.bot_token);
    let mut body = json!({
        "chat_id": config.chat_id,
        "text": format_message(output, config.format),
        "disable_web_page_preview": true,
    });
    match config.format {
        MessageFormat::Markdown => body["parse_mode"] = Value::String("Markdown".into()),
        MessageFormat::Html => body["parse_mode"] = Value::String("HTML".into()),
        MessageFormat::Plain => {}
    }

    super::post_json(client, &url, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventData;
    use crate::programs::ProgramId;

    fn trade_output() -> OutputRecord {
        let mut data = EventData::new();
        data.insert("type".to_string(), Value::String("trade".into()));
        data.insert("direction".to_string(), Value::String("sell".into()));
        data.insert("token".to_string(), Value::String("Mint".into()));
        OutputRecord {
            id: "id".to_string(),
            pipeline_id: "p1".to_string(),
            program: ProgramId::PumpAmm,
            signature: "sig".to_string(),
            timestamp: 0,
            data,
        }
    }

    #[test]
    fn formats_per_style() {
        let output = trade_output();
        let markdown = format_message(&output, MessageFormat::Markdown);
        assert!(markdown.contains("🔴 SELL — pump_amm"));
        assert!(markdown.ends_with("`sig`"));

        let html = format_message(&output, MessageFormat::Html);
        assert!(html.contains("<code>sig</code>"));

        let plain = format_message(&output, MessageFormat::Plain);
        assert!(!plain.contains('`') && !plain.contains("<code>"));
    }
}
