// DANS : src/decoders/pump_amm.rs

use anyhow::Result;
use borsh::{BorshDeserialize, BorshSerialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::decoders::context::{
    infer_token_mints, map_instruction_accounts, primary_instruction, program_data_entries,
    DecodeContext,
};
use crate::decoders::ProgramDecoder;
use crate::envelope::TransactionEnvelope;
use crate::events::{i64_value, pubkey_value, u64_value, Event, EventData};
use crate::programs::{ProgramId, PUMP_AMM_PROGRAM_ID};

// --- DISCRIMINATEURS D'ÉVÉNEMENTS ---
const BUY_EVENT_DISCRIMINATOR: [u8; 8] = [103, 244, 82, 31, 44, 245, 119, 119];
const SELL_EVENT_DISCRIMINATOR: [u8; 8] = [62, 47, 55, 10, 165, 3, 220, 42];
const CREATE_POOL_EVENT_DISCRIMINATOR: [u8; 8] = [177, 49, 12, 210, 160, 118, 167, 116];

// --- STRUCTURES D'ÉVÉNEMENTS ON-CHAIN ---
// Miroirs exacts des layouts de l'IDL pump.fun AMM.

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct BuyEvent {
    pub timestamp: i64,
    pub base_amount_out: u64,
    pub max_quote_amount_in: u64,
    pub user_base_token_reserves: u64,
    pub user_quote_token_reserves: u64,
    pub pool_base_token_reserves: u64,
    pub pool_quote_token_reserves: u64,
    pub quote_amount_in: u64,
    pub lp_fee_basis_points: u64,
    pub lp_fee: u64,
    pub protocol_fee_basis_points: u64,
    pub protocol_fee: u64,
    pub quote_amount_in_with_lp_fee: u64,
    pub user_quote_amount_in: u64,
    pub pool: Pubkey,
    pub user: Pubkey,
    pub user_base_token_account: Pubkey,
    pub user_quote_token_account: Pubkey,
    pub protocol_fee_recipient: Pubkey,
    pub protocol_fee_recipient_token_account: Pubkey,
    pub coin_creator: Pubkey,
    pub coin_creator_fee_basis_points: u64,
    pub coin_creator_fee: u64,
}

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct SellEvent {
    pub timestamp: i64,
    pub base_amount_in: u64,
    pub min_quote_amount_out: u64,
    pub user_base_token_reserves: u64,
    pub user_quote_token_reserves: u64,
    pub pool_base_token_reserves: u64,
    pub pool_quote_token_reserves: u64,
    pub quote_amount_out: u64,
    pub lp_fee_basis_points: u64,
    pub lp_fee: u64,
    pub protocol_fee_basis_points: u64,
    pub protocol_fee: u64,
    pub quote_amount_out_without_lp_fee: u64,
    pub user_quote_amount_out: u64,
    pub pool: Pubkey,
    pub user: Pubkey,
    pub user_base_token_account: Pubkey,
    pub user_quote_token_account: Pubkey,
    pub protocol_fee_recipient: Pubkey,
    pub protocol_fee_recipient_token_account: Pubkey,
    pub coin_creator: Pubkey,
    pub coin_creator_fee_basis_points: u64,
    pub coin_creator_fee: u64,
}

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct CreatePoolEvent {
    pub timestamp: i64,
    pub index: u16,
    pub creator: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_mint_decimals: u8,
    pub quote_mint_decimals: u8,
    pub base_amount_in: u64,
    pub quote_amount_in: u64,
    pub pool_base_amount: u64,
    pub pool_quote_amount: u64,
    pub minimum_liquidity: u64,
    pub initial_liquidity: u64,
    pub lp_token_amount_out: u64,
    pub pool_bump: u8,
    pub pool: Pubkey,
    pub lp_mint: Pubkey,
    pub user_base_token_account: Pubkey,
    pub user_quote_token_account: Pubkey,
}

impl BuyEvent {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("timestamp".to_string(), i64_value(self.timestamp));
        data.insert("base_amount_out".to_string(), u64_value(self.base_amount_out));
        data.insert("max_quote_amount_in".to_string(), u64_value(self.max_quote_amount_in));
        data.insert("pool_base_token_reserves".to_string(), u64_value(self.pool_base_token_reserves));
        data.insert("pool_quote_token_reserves".to_string(), u64_value(self.pool_quote_token_reserves));
        data.insert("quote_amount_in".to_string(), u64_value(self.quote_amount_in));
        data.insert("lp_fee_basis_points".to_string(), u64_value(self.lp_fee_basis_points));
        data.insert("lp_fee".to_string(), u64_value(self.lp_fee));
        data.insert("protocol_fee_basis_points".to_string(), u64_value(self.protocol_fee_basis_points));
        data.insert("protocol_fee".to_string(), u64_value(self.protocol_fee));
        data.insert("quote_amount_in_with_lp_fee".to_string(), u64_value(self.quote_amount_in_with_lp_fee));
        data.insert("user_quote_amount_in".to_string(), u64_value(self.user_quote_amount_in));
        data.insert("pool".to_string(), pubkey_value(&self.pool));
        data.insert("user".to_string(), pubkey_value(&self.user));
        data.insert("protocol_fee_recipient".to_string(), pubkey_value(&self.protocol_fee_recipient));
        data.insert("coin_creator".to_string(), pubkey_value(&self.coin_creator));
        data.insert("coin_creator_fee".to_string(), u64_value(self.coin_creator_fee));
        data.insert("is_buy".to_string(), Value::Bool(true));
        data
    }
}

impl SellEvent {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("timestamp".to_string(), i64_value(self.timestamp));
        data.insert("base_amount_in".to_string(), u64_value(self.base_amount_in));
        data.insert("min_quote_amount_out".to_string(), u64_value(self.min_quote_amount_out));
        data.insert("pool_base_token_reserves".to_string(), u64_value(self.pool_base_token_reserves));
        data.insert("pool_quote_token_reserves".to_string(), u64_value(self.pool_quote_token_reserves));
        data.insert("quote_amount_out".to_string(), u64_value(self.quote_amount_out));
        data.insert("lp_fee_basis_points".to_string(), u64_value(self.lp_fee_basis_points));
        data.insert("lp_fee".to_string(), u64_value(self.lp_fee));
        data.insert("protocol_fee_basis_points".to_string(), u64_value(self.protocol_fee_basis_points));
        data.insert("protocol_fee".to_string(), u64_value(self.protocol_fee));
        data.insert("quote_amount_out_without_lp_fee".to_string(), u64_value(self.quote_amount_out_without_lp_fee));
        data.insert("user_quote_amount_out".to_string(), u64_value(self.user_quote_amount_out));
        data.insert("pool".to_string(), pubkey_value(&self.pool));
        data.insert("user".to_string(), pubkey_value(&self.user));
        data.insert("protocol_fee_recipient".to_string(), pubkey_value(&self.protocol_fee_recipient));
        data.insert("coin_creator".to_string(), pubkey_value(&self.coin_creator));
        data.insert("coin_creator_fee".to_string(), u64_value(self.coin_creator_fee));
        data.insert("is_buy".to_string(), Value::Bool(false));
        data
    }
}

impl CreatePoolEvent {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("timestamp".to_string(), i64_value(self.timestamp));
        data.insert("index".to_string(), Value::from(self.index));
        data.insert("creator".to_string(), pubkey_value(&self.creator));
        data.insert("base_mint".to_string(), pubkey_value(&self.base_mint));
        data.insert("quote_mint".to_string(), pubkey_value(&self.quote_mint));
        data.insert("base_mint_decimals".to_string(), Value::from(self.base_mint_decimals));
        data.insert("quote_mint_decimals".to_string(), Value::from(self.quote_mint_decimals));
        data.insert("base_amount_in".to_string(), u64_value(self.base_amount_in));
        data.insert("quote_amount_in".to_string(), u64_value(self.quote_amount_in));
        data.insert("pool_base_amount".to_string(), u64_value(self.pool_base_amount));
        data.insert("pool_quote_amount".to_string(), u64_value(self.pool_quote_amount));
        data.insert("initial_liquidity".to_string(), u64_value(self.initial_liquidity));
        data.insert("lp_token_amount_out".to_string(), u64_value(self.lp_token_amount_out));
        data.insert("pool".to_string(), pubkey_value(&self.pool));
        data.insert("lp_mint".to_string(), pubkey_value(&self.lp_mint));
        data
    }
}

fn decode_event(discriminator: &[u8; 8], payload: &[u8]) -> Option<(String, EventData)> {
    match *discriminator {
        BUY_EVENT_DISCRIMINATOR => BuyEvent::try_from_slice(payload)
            .ok()
            .map(|event| ("BuyEvent".to_string(), event.into_data())),
        SELL_EVENT_DISCRIMINATOR => SellEvent::try_from_slice(payload)
            .ok()
            .map(|event| ("SellEvent".to_string(), event.into_data())),
        CREATE_POOL_EVENT_DISCRIMINATOR => CreatePoolEvent::try_from_slice(payload)
            .ok()
            .map(|event| ("CreatePoolEvent".to_string(), event.into_data())),
        _ => None,
    }
}

fn roles_for(event_name: &str) -> &'static [(usize, &'static str)] {
    match event_name {
        "BuyEvent" | "SellEvent" => &[
            (0, "pool"),
            (1, "user"),
            (2, "global_config"),
            (3, "base_mint"),
            (4, "quote_mint"),
        ],
        "CreatePoolEvent" => &[(0, "pool"), (1, "global_config"), (2, "creator")],
        _ => &[],
    }
}

/// Décodeur de l'AMM pump.fun (post-migration). Mêmes logs `Program data:`
/// que la bonding curve, avec inférence du couple token/quote depuis les
/// soldes post-transaction quand l'événement ne porte pas les mints.
pub struct PumpAmmDecoder;

impl ProgramDecoder for PumpAmmDecoder {
    fn program(&self) -> ProgramId {
        ProgramId::PumpAmm
    }

    fn parse(&self, envelope: &TransactionEnvelope) -> Result<Vec<Event>> {
        let mut ctx = DecodeContext::new(envelope, ProgramId::PumpAmm);
        let mut events = Vec::new();

        for (owner, bytes) in program_data_entries(envelope) {
            if owner != PUMP_AMM_PROGRAM_ID || bytes.len() < 8 {
                continue;
            }
            let discriminator: [u8; 8] = bytes[..8].try_into().expect("slice de 8 octets");
            let Some((name, mut data)) = decode_event(&discriminator, &bytes[8..]) else {
                debug!("[PumpAmm] Discriminateur de log inconnu sur {}", envelope.signature);
                continue;
            };
            if let Some(ix) = primary_instruction(envelope, &PUMP_AMM_PROGRAM_ID) {
                map_instruction_accounts(envelope, ix, roles_for(&name), &mut data);
            }
            let (token_mint, quote_mint) = infer_token_mints(envelope);
            if let Some(mint) = token_mint {
                data.entry("token_mint".to_string()).or_insert(Value::String(mint));
            }
            if let Some(mint) = quote_mint {
                data.entry("quote_mint".to_string()).or_insert(Value::String(mint));
            }
            events.push(ctx.next_event(&name, data));
        }
        Ok(events)
    }
}
