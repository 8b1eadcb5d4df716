// DANS : src/pipeline/transform.rs

use chrono::{SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::events::{Event, EventData, OutputRecord};
use crate::pipeline::filter::{derive_is_buy, derive_sol_amount, derive_token_amount, value_as_f64};
use crate::programs::LAMPORTS_PER_SOL;

/// Réserve virtuelle de tokens initiale de la bonding curve pump.fun,
/// référence du calcul de progression.
const INITIAL_VIRTUAL_TOKEN_RESERVES: f64 = 1_073_000_000_000_000.0;

// --- SPÉCIFICATION DE TRANSFORMATION ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transform {
    Template {
        #[serde(default)]
        template: TemplateKind,
    },
    Fields {
        fields: Vec<FieldMapping>,
    },
    /// Échappatoire réservée : traitée comme `raw` par le cœur.
    Code {
        code: String,
    },
}

impl Default for Transform {
    fn default() -> Self {
        Transform::Template { template: TemplateKind::Raw }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Trade,
    Transfer,
    Migration,
    #[default]
    Raw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipe: Option<String>,
}

/// Produit l'enregistrement de sortie d'un événement apparié, selon la
/// transformation du pipeline. Seul `data` varie; la base est toujours là.
pub fn apply(transform: &Transform, event: &Event, pipeline_id: &str) -> OutputRecord {
    let data = match transform {
        Transform::Template { template } => match template {
            TemplateKind::Raw => raw_data(event),
            TemplateKind::Trade => trade_data(event),
            TemplateKind::Transfer => transfer_data(event),
            TemplateKind::Migration => migration_data(event),
        },
        Transform::Fields { fields } => fields_data(event, fields),
        Transform::Code { .. } => {
            warn!("[Transform] Transformation `code` non supportée, repli sur raw");
            raw_data(event)
        }
    };

    OutputRecord {
        id: event.id.clone(),
        pipeline_id: pipeline_id.to_string(),
        program: event.program,
        signature: event.signature.clone(),
        timestamp: event.block_time * 1000,
        data,
    }
}

// --- TEMPLATES ---

fn raw_data(event: &Event) -> EventData {
    let mut data = EventData::new();
    data.insert("name".to_string(), Value::String(event.name.clone()));
    data.insert("program".to_string(), Value::String(event.program.as_str().to_string()));
    data.insert("signer".to_string(), Value::String(event.signer.clone()));
    for (key, value) in &event.data {
        data.insert(key.clone(), value.clone());
    }
    data
}

fn first_present<'a>(data: &'a EventData, fields: &[&str]) -> Option<&'a Value> {
    fields.iter().find_map(|field| data.get(*field)).filter(|v| !v.is_null())
}

fn trade_data(event: &Event) -> EventData {
    let mut data = EventData::new();
    data.insert("type".to_string(), Value::String("trade".into()));
    data.insert("eventName".to_string(), Value::String(event.name.clone()));
    data.insert("trader".to_string(), Value::String(event.signer.clone()));

    let direction = match derive_is_buy(event) {
        Some(true) => "buy",
        Some(false) => "sell",
        None => "swap",
    };
    data.insert("direction".to_string(), Value::String(direction.into()));

    let token = first_present(&event.data, &["mint", "token_mint", "base_mint", "input_mint", "pool"]);
    data.insert(
        "token".to_string(),
        token.cloned().unwrap_or(Value::Null),
    );

    if let Some(sol) = derive_sol_amount(&event.data) {
        data.insert("solAmount".to_string(), Value::from(sol));
    }
    if let Some(tokens) = derive_token_amount(&event.data) {
        data.insert("tokenAmount".to_string(), Value::from(tokens));
    }

    // Montants d'entrée/sortie : champs plats, sinon le struct imbriqué.
    let input = first_present(&event.data, &["amount_in", "input_amount", "actual_amount_in"])
        .cloned()
        .or_else(|| lookup_nested(&event.data, "swap_result", "actual_input_amount"));
    if let Some(input) = input {
        data.insert("inputAmount".to_string(), input);
    }
    let output = first_present(&event.data, &["amount_out", "output_amount"])
        .cloned()
        .or_else(|| lookup_nested(&event.data, "swap_result", "output_amount"));
    if let Some(output) = output {
        data.insert("outputAmount".to_string(), output);
    }
    if let Some(fee) = lookup_nested(&event.data, "swap_result", "trading_fee") {
        data.insert("tradingFee".to_string(), fee);
    }

    // Prix implicite depuis les réserves virtuelles.
    let virtual_sol = event.data.get("virtual_sol_reserves").and_then(value_as_f64);
    let virtual_tokens = event.data.get("virtual_token_reserves").and_then(value_as_f64);
    if let (Some(sol), Some(tokens)) = (virtual_sol, virtual_tokens) {
        if tokens > 0.0 {
            data.insert("price".to_string(), Value::from(sol / tokens));
        }
    }

    data.insert(
        "pool".to_string(),
        first_present(&event.data, &["pool", "pool_state", "pool_id"])
            .cloned()
            .unwrap_or(Value::Null),
    );
    data
}

fn transfer_data(event: &Event) -> EventData {
    let mut data = EventData::new();
    data.insert("type".to_string(), Value::String("transfer".into()));
    data.insert("eventName".to_string(), Value::String(event.name.clone()));
    let from = first_present(&event.data, &["from", "user", "owner"])
        .cloned()
        .unwrap_or(Value::String(event.signer.clone()));
    data.insert("from".to_string(), from);
    data.insert(
        "to".to_string(),
        first_present(&event.data, &["to", "destination"]).cloned().unwrap_or(Value::Null),
    );
    data.insert(
        "amount".to_string(),
        first_present(&event.data, &["amount", "token_amount", "sol_amount"])
            .cloned()
            .unwrap_or(Value::Null),
    );
    data.insert(
        "mint".to_string(),
        first_present(&event.data, &["mint", "token_mint", "base_mint"])
            .cloned()
            .unwrap_or(Value::Null),
    );
    data
}

fn migration_data(event: &Event) -> EventData {
    let mut data = EventData::new();
    data.insert("type".to_string(), Value::String("migration".into()));
    data.insert("eventName".to_string(), Value::String(event.name.clone()));
    data.insert(
        "token".to_string(),
        first_present(&event.data, &["mint", "token_mint", "base_mint"])
            .cloned()
            .unwrap_or(Value::Null),
    );
    data.insert(
        "pool".to_string(),
        first_present(&event.data, &["pool", "virtual_pool", "bonding_curve"])
            .cloned()
            .unwrap_or(Value::Null),
    );
    data.insert(
        "creator".to_string(),
        first_present(&event.data, &["creator", "user"]).cloned().unwrap_or(Value::Null),
    );
    if let Some(lamports) = event.data.get("virtual_sol_reserves").and_then(value_as_f64) {
        data.insert("solRaised".to_string(), Value::from(lamports / LAMPORTS_PER_SOL));
    }
    data.insert("timestamp".to_string(), Value::from(event.block_time));
    data
}

fn lookup_nested(data: &EventData, parent: &str, key: &str) -> Option<Value> {
    data.get(parent)?.get(key).cloned()
}

// --- MODE FIELDS ---

fn fields_data(event: &Event, fields: &[FieldMapping]) -> EventData {
    let mut data = EventData::new();
    for mapping in fields {
        // Un chemin source absent est un résultat légitime : la clé est omise.
        let Some(value) = event.lookup(&mapping.source) else {
            continue;
        };
        let value = match &mapping.pipe {
            Some(pipe) => apply_pipe(pipe, value),
            None => value,
        };
        data.insert(mapping.target.clone(), value);
    }
    data
}

// --- PIPES ---

pub fn apply_pipe(name: &str, value: Value) -> Value {
    match name {
        "lamportsToSol" => lamports_to_sol(value),
        "base58" => Value::String(value.as_str().map(|s| s.to_string()).unwrap_or_else(|| value.to_string())),
        "timestamp" => to_iso_timestamp(value),
        "shorten" => shorten(value),
        "bondingCurveProgress" => bonding_curve_progress(value),
        other => {
            // Pipe inconnu : identité.
            warn!("[Transform] Pipe inconnu `{}`", other);
            value
        }
    }
}

fn lamports_to_sol(value: Value) -> Value {
    match value_as_f64(&value) {
        Some(lamports) => Value::from(lamports / LAMPORTS_PER_SOL),
        None => value,
    }
}

/// Secondes Unix -> chaîne ISO-8601 UTC.
fn to_iso_timestamp(value: Value) -> Value {
    let Some(seconds) = value_as_f64(&value) else {
        return value;
    };
    match Utc.timestamp_opt(seconds as i64, 0) {
        chrono::LocalResult::Single(moment) => {
            Value::String(moment.to_rfc3339_opts(SecondsFormat::Secs, true))
        }
        _ => value,
    }
}

fn shorten(value: Value) -> Value {
    match value.as_str() {
        Some(s) if s.chars().count() > 12 => {
            let head: String = s.chars().take(4).collect();
            let tail: String = s.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            Value::String(format!("{}...{}", head, tail))
        }
        _ => value,
    }
}

/// Progression de la bonding curve en pourcentage, bornée à [0, 100],
/// arrondie à deux décimales.
fn bonding_curve_progress(value: Value) -> Value {
    let Some(current) = value_as_f64(&value) else {
        return value;
    };
    let progress = (INITIAL_VIRTUAL_TOKEN_RESERVES - current) / INITIAL_VIRTUAL_TOKEN_RESERVES * 100.0;
    let clamped = progress.clamp(0.0, 100.0);
    Value::from((clamped * 100.0).round() / 100.0)
}
