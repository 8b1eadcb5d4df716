// DANS : src/decoders/pump_fun.rs

use anyhow::Result;
use borsh::{BorshDeserialize, BorshSerialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::decoders::context::{
    map_instruction_accounts, primary_instruction, program_data_entries, DecodeContext,
};
use crate::decoders::ProgramDecoder;
use crate::envelope::TransactionEnvelope;
use crate::events::{i64_value, pubkey_value, u64_value, Event, EventData};
use crate::programs::{ProgramId, PUMP_FUN_PROGRAM_ID};

// --- DISCRIMINATEURS D'ÉVÉNEMENTS ---
// sha256("event:<Nom>")[..8], trouvés dans l'IDL.
pub const TRADE_EVENT_DISCRIMINATOR: [u8; 8] = [189, 219, 127, 211, 78, 230, 97, 238];
const CREATE_EVENT_DISCRIMINATOR: [u8; 8] = [27, 114, 169, 77, 222, 235, 99, 118];
const COMPLETE_EVENT_DISCRIMINATOR: [u8; 8] = [95, 114, 97, 156, 212, 46, 152, 8];

// --- STRUCTURES D'ÉVÉNEMENTS ON-CHAIN ---

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct TradeEvent {
    pub mint: Pubkey,
    pub sol_amount: u64,
    pub token_amount: u64,
    pub is_buy: bool,
    pub user: Pubkey,
    pub timestamp: i64,
    pub virtual_sol_reserves: u64,
    pub virtual_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub real_token_reserves: u64,
}

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct CreateEvent {
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub user: Pubkey,
    pub creator: Pubkey,
    pub timestamp: i64,
}

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct CompleteEvent {
    pub user: Pubkey,
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub timestamp: i64,
}

impl TradeEvent {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("mint".to_string(), pubkey_value(&self.mint));
        data.insert("sol_amount".to_string(), u64_value(self.sol_amount));
        data.insert("token_amount".to_string(), u64_value(self.token_amount));
        data.insert("is_buy".to_string(), Value::Bool(self.is_buy));
        data.insert("user".to_string(), pubkey_value(&self.user));
        data.insert("timestamp".to_string(), i64_value(self.timestamp));
        data.insert("virtual_sol_reserves".to_string(), u64_value(self.virtual_sol_reserves));
        data.insert("virtual_token_reserves".to_string(), u64_value(self.virtual_token_reserves));
        data.insert("real_sol_reserves".to_string(), u64_value(self.real_sol_reserves));
        data.insert("real_token_reserves".to_string(), u64_value(self.real_token_reserves));
        data
    }
}

impl CreateEvent {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("name".to_string(), Value::String(self.name));
        data.insert("symbol".to_string(), Value::String(self.symbol));
        data.insert("uri".to_string(), Value::String(self.uri));
        data.insert("mint".to_string(), pubkey_value(&self.mint));
        data.insert("bonding_curve".to_string(), pubkey_value(&self.bonding_curve));
        data.insert("user".to_string(), pubkey_value(&self.user));
        data.insert("creator".to_string(), pubkey_value(&self.creator));
        data.insert("timestamp".to_string(), i64_value(self.timestamp));
        data
    }
}

impl CompleteEvent {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("user".to_string(), pubkey_value(&self.user));
        data.insert("mint".to_string(), pubkey_value(&self.mint));
        data.insert("bonding_curve".to_string(), pubkey_value(&self.bonding_curve));
        data.insert("timestamp".to_string(), i64_value(self.timestamp));
        data
    }
}

fn decode_event(discriminator: &[u8; 8], payload: &[u8]) -> Option<(String, EventData)> {
    match *discriminator {
        TRADE_EVENT_DISCRIMINATOR => TradeEvent::try_from_slice(payload)
            .ok()
            .map(|event| ("TradeEvent".to_string(), event.into_data())),
        CREATE_EVENT_DISCRIMINATOR => CreateEvent::try_from_slice(payload)
            .ok()
            .map(|event| ("CreateEvent".to_string(), event.into_data())),
        COMPLETE_EVENT_DISCRIMINATOR => CompleteEvent::try_from_slice(payload)
            .ok()
            .map(|event| ("CompleteEvent".to_string(), event.into_data())),
        _ => None,
    }
}

/// Table de rôles de l'instruction principale, par nom d'événement.
fn roles_for(event_name: &str) -> &'static [(usize, &'static str)] {
    match event_name {
        // Instructions buy/sell : même ordre de comptes.
        "TradeEvent" => &[
            (0, "global"),
            (1, "fee_recipient"),
            (2, "mint"),
            (3, "bonding_curve"),
            (4, "associated_bonding_curve"),
            (5, "associated_user"),
            (6, "user"),
        ],
        "CreateEvent" => &[
            (0, "mint"),
            (1, "mint_authority"),
            (2, "bonding_curve"),
            (3, "associated_bonding_curve"),
            (4, "global"),
            (7, "user"),
        ],
        _ => &[],
    }
}

/// Décodeur du programme de bonding curve pump.fun. Les événements sont
/// émis en lignes de log `Program data: <base64>`.
pub struct PumpFunDecoder;

impl ProgramDecoder for PumpFunDecoder {
    fn program(&self) -> ProgramId {
        ProgramId::PumpFun
    }

    fn parse(&self, envelope: &TransactionEnvelope) -> Result<Vec<Event>> {
        let mut ctx = DecodeContext::new(envelope, ProgramId::PumpFun);
        let mut events = Vec::new();

        for (owner, bytes) in program_data_entries(envelope) {
            if owner != PUMP_FUN_PROGRAM_ID || bytes.len() < 8 {
                continue;
            }
            let discriminator: [u8; 8] = bytes[..8].try_into().expect("slice de 8 octets");
            let Some((name, mut data)) = decode_event(&discriminator, &bytes[8..]) else {
                debug!("[PumpFun] Discriminateur de log inconnu sur {}", envelope.signature);
                continue;
            };
            if let Some(ix) = primary_instruction(envelope, &PUMP_FUN_PROGRAM_ID) {
                map_instruction_accounts(envelope, ix, roles_for(&name), &mut data);
            }
            events.push(ctx.next_event(&name, data));
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::CompiledIx;
    use crate::programs::WSOL_MINT;

    fn sample_trade() -> TradeEvent {
        TradeEvent {
            mint: WSOL_MINT,
            sol_amount: 1_000_000_000,
            token_amount: 5_000_000,
            is_buy: true,
            user: PUMP_FUN_PROGRAM_ID,
            timestamp: 1_700_000_000,
            virtual_sol_reserves: 30_000_000_000,
            virtual_token_reserves: 1_000_000_000_000,
            real_sol_reserves: 1_000_000_000,
            real_token_reserves: 800_000_000_000,
        }
    }

    fn envelope_with_trade() -> TransactionEnvelope {
        let mut payload = TRADE_EVENT_DISCRIMINATOR.to_vec();
        payload.extend(sample_trade().try_to_vec().unwrap());
        TransactionEnvelope {
            signature: "5igSig".to_string(),
            slot: 100,
            block_time: 1_700_000_000,
            account_keys: vec![WSOL_MINT, PUMP_FUN_PROGRAM_ID],
            log_messages: vec![
                format!("Program {} invoke [1]", PUMP_FUN_PROGRAM_ID),
                format!("Program data: {}", base64::encode(&payload)),
                format!("Program {} success", PUMP_FUN_PROGRAM_ID),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn decodes_trade_event_from_logs() {
        let envelope = envelope_with_trade();
        let events = PumpFunDecoder.parse(&envelope).unwrap();

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.name, "TradeEvent");
        assert!(event.id.ends_with(":0"));
        assert_eq!(event.data["sol_amount"], Value::String("1000000000".into()));
        assert_eq!(event.data["token_amount"], Value::String("5000000".into()));
        assert_eq!(event.data["is_buy"], Value::Bool(true));
        assert_eq!(event.signer, WSOL_MINT.to_string());
    }

    #[test]
    fn parse_is_deterministic_and_ids_unique() {
        let envelope = envelope_with_trade();
        let first = PumpFunDecoder.parse(&envelope).unwrap();
        let second = PumpFunDecoder.parse(&envelope).unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].data, second[0].data);
    }

    #[test]
    fn multiple_events_are_numbered_in_emission_order() {
        let mut payload = TRADE_EVENT_DISCRIMINATOR.to_vec();
        payload.extend(sample_trade().try_to_vec().unwrap());
        let encoded = base64::encode(&payload);
        let envelope = TransactionEnvelope {
            signature: "5igSig".to_string(),
            account_keys: vec![WSOL_MINT, PUMP_FUN_PROGRAM_ID],
            log_messages: vec![
                format!("Program {} invoke [1]", PUMP_FUN_PROGRAM_ID),
                format!("Program data: {}", encoded),
                format!("Program data: {}", encoded),
                format!("Program {} success", PUMP_FUN_PROGRAM_ID),
            ],
            ..Default::default()
        };
        let events = PumpFunDecoder.parse(&envelope).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].id.ends_with(":0"));
        assert!(events[1].id.ends_with(":1"));
        assert_ne!(events[0].id, events[1].id);
    }

    #[test]
    fn aggregator_presence_attributes_source() {
        let mut envelope = envelope_with_trade();
        envelope
            .account_keys
            .push(crate::programs::JUPITER_V6_PROGRAM_ID);
        let events = PumpFunDecoder.parse(&envelope).unwrap();
        assert_eq!(events[0].source.source_type, crate::events::SourceType::Jupiter);
        assert_eq!(
            events[0].source.outer_program,
            Some(crate::programs::JUPITER_V6_PROGRAM_ID.to_string())
        );
    }

    #[test]
    fn unknown_discriminator_is_skipped() {
        let mut envelope = envelope_with_trade();
        envelope.log_messages[1] =
            format!("Program data: {}", base64::encode([0u8; 24]));
        assert!(PumpFunDecoder.parse(&envelope).unwrap().is_empty());
    }

    #[test]
    fn role_accounts_are_added_without_overwriting() {
        let mut envelope = envelope_with_trade();
        // Comptes de l'instruction buy : global, fee_recipient, mint, curve…
        envelope.account_keys = vec![
            WSOL_MINT,
            PUMP_FUN_PROGRAM_ID,
            crate::programs::PUMP_AMM_PROGRAM_ID,
            crate::programs::METEORA_DBC_PROGRAM_ID,
        ];
        envelope.instructions = vec![CompiledIx {
            program_id_index: 1,
            accounts: vec![2, 3],
            data: vec![],
        }];
        let events = PumpFunDecoder.parse(&envelope).unwrap();
        let data = &events[0].data;
        assert_eq!(
            data["global"],
            Value::String(crate::programs::PUMP_AMM_PROGRAM_ID.to_string())
        );
        assert_eq!(
            data["fee_recipient"],
            Value::String(crate::programs::METEORA_DBC_PROGRAM_ID.to_string())
        );
        // `mint` vient de l'événement, pas de la table de rôles.
        assert_eq!(data["mint"], Value::String(WSOL_MINT.to_string()));
    }
}
