// DANS : src/decoders/meteora_dbc.rs

use anyhow::Result;
use borsh::{BorshDeserialize, BorshSerialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::decoders::context::{
    decode_cpi_payload, flatten_first_level, inner_instruction_payloads, map_instruction_accounts,
    DecodeContext,
};
use crate::decoders::ProgramDecoder;
use crate::envelope::{CompiledIx, TransactionEnvelope};
use crate::events::{pubkey_value, u128_value, u64_value, Event, EventData};
use crate::programs::{ProgramId, METEORA_DBC_PROGRAM_ID};

// --- DISCRIMINATEURS D'ÉVÉNEMENTS ---
pub const EVT_SWAP_DISCRIMINATOR: [u8; 8] = [27, 60, 21, 213, 138, 170, 187, 147];
const EVT_CURVE_COMPLETE_DISCRIMINATOR: [u8; 8] = [229, 231, 86, 84, 156, 134, 75, 24];

// --- DISCRIMINATEURS D'INSTRUCTIONS ---
// Certaines activités ne s'observent que par l'instruction, pas par un
// événement : initialisation de pool (deux formats de token) et migration.
const INIT_POOL_SPL_DISCRIMINATOR: [u8; 8] = [140, 85, 215, 176, 102, 54, 104, 79];
const INIT_POOL_TOKEN2022_DISCRIMINATOR: [u8; 8] = [169, 118, 51, 78, 145, 110, 220, 155];
const MIGRATION_DAMM_V2_DISCRIMINATOR: [u8; 8] = [156, 169, 230, 103, 53, 228, 80, 64];

// Bornes des métadonnées UTF-8 à longueur préfixée du payload d'initialisation.
const MAX_NAME_LEN: usize = 200;
const MAX_SYMBOL_LEN: usize = 50;
const MAX_URI_LEN: usize = 500;

// --- STRUCTURES D'ÉVÉNEMENTS ON-CHAIN ---

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct SwapParameters {
    pub amount_in: u64,
    pub minimum_amount_out: u64,
}

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct SwapResult {
    pub actual_input_amount: u64,
    pub output_amount: u64,
    pub next_sqrt_price: u128,
    pub trading_fee: u64,
    pub protocol_fee: u64,
    pub referral_fee: u64,
}

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct EvtSwap {
    pub pool: Pubkey,
    pub config: Pubkey,
    pub trade_direction: u8,
    pub has_referral: bool,
    pub params: SwapParameters,
    pub swap_result: SwapResult,
    pub amount_in: u64,
    pub current_timestamp: u64,
}

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct EvtCurveComplete {
    pub pool: Pubkey,
    pub config: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_reserve: u64,
    pub quote_reserve: u64,
}

impl SwapResult {
    fn to_object(&self) -> Value {
        let mut nested = EventData::new();
        nested.insert("actual_input_amount".to_string(), u64_value(self.actual_input_amount));
        nested.insert("output_amount".to_string(), u64_value(self.output_amount));
        nested.insert("next_sqrt_price".to_string(), u128_value(self.next_sqrt_price));
        nested.insert("trading_fee".to_string(), u64_value(self.trading_fee));
        nested.insert("protocol_fee".to_string(), u64_value(self.protocol_fee));
        nested.insert("referral_fee".to_string(), u64_value(self.referral_fee));
        Value::Object(nested)
    }
}

impl EvtSwap {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("pool".to_string(), pubkey_value(&self.pool));
        data.insert("config".to_string(), pubkey_value(&self.config));
        data.insert("trade_direction".to_string(), Value::from(self.trade_direction));
        data.insert("has_referral".to_string(), Value::Bool(self.has_referral));
        let mut params = EventData::new();
        params.insert("amount_in".to_string(), u64_value(self.params.amount_in));
        params.insert("minimum_amount_out".to_string(), u64_value(self.params.minimum_amount_out));
        data.insert("params".to_string(), Value::Object(params));
        data.insert("swap_result".to_string(), self.swap_result.to_object());
        data.insert("amount_in".to_string(), u64_value(self.amount_in));
        data.insert("current_timestamp".to_string(), u64_value(self.current_timestamp));
        // Les deux formes sont exposées : imbriquée pour les templates qui
        // déréférencent `swap_result.*`, aplatie pour les filtres.
        flatten_first_level(&mut data);
        data
    }
}

impl EvtCurveComplete {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("pool".to_string(), pubkey_value(&self.pool));
        data.insert("config".to_string(), pubkey_value(&self.config));
        data.insert("base_mint".to_string(), pubkey_value(&self.base_mint));
        data.insert("quote_mint".to_string(), pubkey_value(&self.quote_mint));
        data.insert("base_reserve".to_string(), u64_value(self.base_reserve));
        data.insert("quote_reserve".to_string(), u64_value(self.quote_reserve));
        data
    }
}

fn decode_event(discriminator: &[u8; 8], payload: &[u8]) -> Option<(String, EventData)> {
    match *discriminator {
        EVT_SWAP_DISCRIMINATOR => EvtSwap::try_from_slice(payload)
            .ok()
            .map(|event| ("EvtSwap".to_string(), event.into_data())),
        EVT_CURVE_COMPLETE_DISCRIMINATOR => EvtCurveComplete::try_from_slice(payload)
            .ok()
            .map(|event| ("EvtCurveComplete".to_string(), event.into_data())),
        _ => None,
    }
}

// --- DÉTECTION PAR TYPE D'INSTRUCTION ---

/// Lit une chaîne UTF-8 à longueur préfixée (u32 LE) bornée par `max_len`.
/// Retourne None et abandonne sur longueur invalide.
fn read_bounded_string(data: &[u8], offset: &mut usize, max_len: usize) -> Option<String> {
    let len_bytes: [u8; 4] = data.get(*offset..*offset + 4)?.try_into().ok()?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > max_len {
        return None;
    }
    let bytes = data.get(*offset + 4..*offset + 4 + len)?;
    let value = std::str::from_utf8(bytes).ok()?.to_string();
    *offset += 4 + len;
    Some(value)
}

/// Extrait `name`, `symbol`, `uri` du payload d'initialisation.
/// Abandon silencieux : une longueur hors borne rend un triplet vide.
fn parse_pool_metadata(payload: &[u8]) -> Option<(String, String, String)> {
    let mut offset = 0usize;
    let name = read_bounded_string(payload, &mut offset, MAX_NAME_LEN)?;
    let symbol = read_bounded_string(payload, &mut offset, MAX_SYMBOL_LEN)?;
    let uri = read_bounded_string(payload, &mut offset, MAX_URI_LEN)?;
    Some((name, symbol, uri))
}

const INIT_POOL_ROLES: &[(usize, &str)] = &[
    (0, "config"),
    (1, "pool_authority"),
    (2, "creator"),
    (3, "base_mint"),
    (4, "quote_mint"),
    (5, "pool"),
    (6, "base_vault"),
    (7, "quote_vault"),
    (8, "payer"),
];

const MIGRATION_ROLES: &[(usize, &str)] = &[
    (0, "virtual_pool"),
    (1, "migration_metadata"),
    (2, "config"),
    (3, "pool_authority"),
    (4, "pool"),
    (5, "base_mint"),
    (6, "quote_mint"),
];

/// Événement synthétisé depuis une instruction quand aucun événement CPI n'a
/// été décodé pour cette transaction.
fn synthesize_from_instruction(
    envelope: &TransactionEnvelope,
    ix: &CompiledIx,
) -> Option<(String, EventData)> {
    let discriminator: [u8; 8] = ix.data.get(..8)?.try_into().ok()?;
    match discriminator {
        INIT_POOL_SPL_DISCRIMINATOR | INIT_POOL_TOKEN2022_DISCRIMINATOR => {
            let mut data = EventData::new();
            let token_format = if discriminator == INIT_POOL_SPL_DISCRIMINATOR {
                "spl"
            } else {
                "token2022"
            };
            data.insert("token_format".to_string(), Value::String(token_format.into()));
            map_instruction_accounts(envelope, ix, INIT_POOL_ROLES, &mut data);
            if let Some((name, symbol, uri)) = parse_pool_metadata(&ix.data[8..]) {
                data.insert("name".to_string(), Value::String(name));
                data.insert("symbol".to_string(), Value::String(symbol));
                data.insert("uri".to_string(), Value::String(uri));
            }
            Some(("EvtInitializePool".to_string(), data))
        }
        MIGRATION_DAMM_V2_DISCRIMINATOR => {
            let mut data = EventData::new();
            map_instruction_accounts(envelope, ix, MIGRATION_ROLES, &mut data);
            Some(("EvtMigrationDAMMV2".to_string(), data))
        }
        _ => None,
    }
}

/// Décodeur du programme de bonding curve dynamique Meteora. Les événements
/// arrivent en auto-invocation CPI, précédés du wrapper Anchor; certaines
/// activités sont inférées du discriminateur d'instruction.
pub struct MeteoraDbcDecoder;

impl ProgramDecoder for MeteoraDbcDecoder {
    fn program(&self) -> ProgramId {
        ProgramId::MeteoraDbc
    }

    fn parse(&self, envelope: &TransactionEnvelope) -> Result<Vec<Event>> {
        let mut ctx = DecodeContext::new(envelope, ProgramId::MeteoraDbc);
        let mut events = Vec::new();

        for payload in inner_instruction_payloads(envelope, 16) {
            if let Some((name, data)) = decode_cpi_payload(payload, decode_event) {
                events.push(ctx.next_event(&name, data));
            }
        }

        if events.is_empty() {
            // Repli : instruction présente sans événement décodé.
            for ix in &envelope.instructions {
                if envelope.program_of(ix) != Some(&METEORA_DBC_PROGRAM_ID) {
                    continue;
                }
                if let Some((name, data)) = synthesize_from_instruction(envelope, ix) {
                    debug!("[MeteoraDbc] Événement {} synthétisé sur {}", name, envelope.signature);
                    events.push(ctx.next_event(&name, data));
                    break;
                }
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::context::ANCHOR_EVENT_CPI_DISCRIMINATOR;
    use crate::envelope::InnerIxGroup;
    use crate::programs::WSOL_MINT;

    fn sample_swap() -> EvtSwap {
        EvtSwap {
            pool: WSOL_MINT,
            config: METEORA_DBC_PROGRAM_ID,
            trade_direction: 0,
            has_referral: false,
            params: SwapParameters { amount_in: 1_000_000_000, minimum_amount_out: 1 },
            swap_result: SwapResult {
                actual_input_amount: 990_000_000,
                output_amount: 123_456,
                next_sqrt_price: 79_228_162_514_264_337_593u128,
                trading_fee: 10_000_000,
                protocol_fee: 2_000_000,
                referral_fee: 0,
            },
            amount_in: 1_000_000_000,
            current_timestamp: 1_700_000_000,
        }
    }

    fn envelope_with_inner(data: Vec<u8>) -> TransactionEnvelope {
        TransactionEnvelope {
            signature: "sig".to_string(),
            account_keys: vec![WSOL_MINT, METEORA_DBC_PROGRAM_ID],
            inner_instructions: vec![InnerIxGroup {
                outer_index: 0,
                instructions: vec![CompiledIx { program_id_index: 1, accounts: vec![], data }],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn decodes_wrapped_cpi_event() {
        let mut data = ANCHOR_EVENT_CPI_DISCRIMINATOR.to_vec();
        data.extend(EVT_SWAP_DISCRIMINATOR);
        data.extend(sample_swap().try_to_vec().unwrap());
        let envelope = envelope_with_inner(data);

        let events = MeteoraDbcDecoder.parse(&envelope).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.name, "EvtSwap");
        // Forme imbriquée et forme aplatie toutes deux présentes.
        assert_eq!(event.data["swap_result"]["output_amount"], Value::String("123456".into()));
        assert_eq!(event.data["output_amount"], Value::String("123456".into()));
        assert_eq!(event.data["trade_direction"], Value::from(0u8));
    }

    #[test]
    fn decodes_unwrapped_cpi_event() {
        let mut data = EVT_SWAP_DISCRIMINATOR.to_vec();
        data.extend(sample_swap().try_to_vec().unwrap());
        let events = MeteoraDbcDecoder.parse(&envelope_with_inner(data)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "EvtSwap");
    }

    #[test]
    fn synthesizes_initialize_pool_with_metadata() {
        let mut ix_data = INIT_POOL_SPL_DISCRIMINATOR.to_vec();
        for text in ["Token Name", "TKN", "https://uri"] {
            ix_data.extend((text.len() as u32).to_le_bytes());
            ix_data.extend(text.as_bytes());
        }
        let envelope = TransactionEnvelope {
            signature: "sig".to_string(),
            account_keys: vec![WSOL_MINT, METEORA_DBC_PROGRAM_ID],
            instructions: vec![CompiledIx {
                program_id_index: 1,
                accounts: vec![0, 1, 0, 1, 0, 1, 0, 1, 0],
                data: ix_data,
            }],
            ..Default::default()
        };

        let events = MeteoraDbcDecoder.parse(&envelope).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.name, "EvtInitializePool");
        assert_eq!(event.data["name"], Value::String("Token Name".into()));
        assert_eq!(event.data["symbol"], Value::String("TKN".into()));
        assert_eq!(event.data["uri"], Value::String("https://uri".into()));
        assert_eq!(event.data["token_format"], Value::String("spl".into()));
        assert_eq!(event.data["config"], Value::String(WSOL_MINT.to_string()));
    }

    #[test]
    fn bad_metadata_length_omits_fields_silently() {
        let mut ix_data = INIT_POOL_TOKEN2022_DISCRIMINATOR.to_vec();
        // Longueur de nom au-delà de la borne : abandon du triplet.
        ix_data.extend((300u32).to_le_bytes());
        ix_data.extend(vec![b'a'; 300]);
        let envelope = TransactionEnvelope {
            signature: "sig".to_string(),
            account_keys: vec![WSOL_MINT, METEORA_DBC_PROGRAM_ID],
            instructions: vec![CompiledIx { program_id_index: 1, accounts: vec![], data: ix_data }],
            ..Default::default()
        };
        let events = MeteoraDbcDecoder.parse(&envelope).unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].data.contains_key("name"));
        assert_eq!(events[0].data["token_format"], Value::String("token2022".into()));
    }

    #[test]
    fn synthesizes_migration_event() {
        let envelope = TransactionEnvelope {
            signature: "sig".to_string(),
            account_keys: vec![WSOL_MINT, METEORA_DBC_PROGRAM_ID],
            instructions: vec![CompiledIx {
                program_id_index: 1,
                accounts: vec![0],
                data: MIGRATION_DAMM_V2_DISCRIMINATOR.to_vec(),
            }],
            ..Default::default()
        };
        let events = MeteoraDbcDecoder.parse(&envelope).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "EvtMigrationDAMMV2");
        assert_eq!(events[0].data["virtual_pool"], Value::String(WSOL_MINT.to_string()));
    }

    #[test]
    fn no_fallback_when_an_event_was_decoded() {
        let mut data = EVT_SWAP_DISCRIMINATOR.to_vec();
        data.extend(sample_swap().try_to_vec().unwrap());
        let mut envelope = envelope_with_inner(data);
        envelope.instructions = vec![CompiledIx {
            program_id_index: 1,
            accounts: vec![],
            data: MIGRATION_DAMM_V2_DISCRIMINATOR.to_vec(),
        }];
        let events = MeteoraDbcDecoder.parse(&envelope).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "EvtSwap");
    }
}
