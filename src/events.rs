// DANS : src/events.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use solana_sdk::pubkey::Pubkey;

use crate::programs::ProgramId;

/// Charge utile dynamique d'un événement décodé.
/// Les entiers larges (u64/i64/u128) sont émis en chaînes décimales, les
/// adresses et blobs d'octets en base58, le reste en types JSON natifs.
pub type EventData = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Direct,
    Jupiter,
    Raydium,
    Unknown,
}

/// Attribution de l'événement : appel direct au programme, ou routage
/// via un agrégateur connu présent dans les comptes de la transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSource {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(rename = "outerProgram", skip_serializing_if = "Option::is_none")]
    pub outer_program: Option<String>,
}

impl EventSource {
    pub fn direct() -> Self {
        Self { source_type: SourceType::Direct, outer_program: None }
    }

    pub fn aggregator(tag: &str, outer_program: &Pubkey) -> Self {
        let source_type = match tag {
            "jupiter" => SourceType::Jupiter,
            "raydium" => SourceType::Raydium,
            _ => SourceType::Unknown,
        };
        Self { source_type, outer_program: Some(outer_program.to_string()) }
    }
}

/// Événement normalisé, sortie canonique de la couche de décodage.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    pub program: ProgramId,
    #[serde(rename = "programAddress")]
    pub program_address: String,
    pub name: String,
    pub signature: String,
    pub slot: u64,
    #[serde(rename = "blockTime")]
    pub block_time: i64,
    pub signer: String,
    pub source: EventSource,
    pub data: EventData,
}

impl Event {
    /// Identifiant unique et déterministe : `{signature}:{programAddress}:{n}`.
    pub fn event_id(signature: &str, program_address: &Pubkey, sequence: usize) -> String {
        format!("{}:{}:{}", signature, program_address, sequence)
    }

    /// Recherche par chemin pointé, racine = l'événement complet (y compris
    /// le sous-arbre `data`). Un premier segment qui n'est pas un champ racine
    /// est cherché directement dans `data`.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;

        let mut current: Value = match first {
            "id" => Value::String(self.id.clone()),
            "program" => Value::String(self.program.as_str().to_string()),
            "programAddress" | "program_address" => Value::String(self.program_address.clone()),
            "name" => Value::String(self.name.clone()),
            "signature" => Value::String(self.signature.clone()),
            "slot" => Value::from(self.slot),
            "blockTime" | "block_time" => Value::from(self.block_time),
            "signer" => Value::String(self.signer.clone()),
            "source" => serde_json::to_value(&self.source).ok()?,
            "data" => Value::Object(self.data.clone()),
            other => self.data.get(other)?.clone(),
        };

        for segment in segments {
            current = current.get(segment)?.clone();
        }
        Some(current)
    }
}

/// Résultat par pipeline et par événement, l'unité consommée par les
/// destinations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub id: String,
    pub pipeline_id: String,
    pub program: ProgramId,
    pub signature: String,
    /// blockTime de l'événement, en millisecondes.
    pub timestamp: i64,
    pub data: EventData,
}

// --- NORMALISATION DES VALEURS DÉCODÉES ---

pub fn pubkey_value(key: &Pubkey) -> Value {
    Value::String(key.to_string())
}

pub fn u64_value(value: u64) -> Value {
    Value::String(value.to_string())
}

pub fn i64_value(value: i64) -> Value {
    Value::String(value.to_string())
}

pub fn u128_value(value: u128) -> Value {
    Value::String(value.to_string())
}

pub fn bytes_value(bytes: &[u8]) -> Value {
    Value::String(bs58::encode(bytes).into_string())
}
