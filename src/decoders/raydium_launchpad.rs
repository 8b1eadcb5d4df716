// DANS : src/decoders/raydium_launchpad.rs

use anyhow::Result;
use borsh::{BorshDeserialize, BorshSerialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;

use crate::decoders::context::{
    decode_cpi_payload, inner_instruction_payloads, map_instruction_accounts,
    primary_instruction, DecodeContext,
};
use crate::decoders::ProgramDecoder;
use crate::envelope::TransactionEnvelope;
use crate::events::{pubkey_value, u64_value, Event, EventData};
use crate::programs::{ProgramId, RAYDIUM_LAUNCHPAD_PROGRAM_ID};

// --- DISCRIMINATEURS D'ÉVÉNEMENTS ---
pub const TRADE_EVENT_DISCRIMINATOR: [u8; 8] = [189, 219, 127, 211, 78, 230, 97, 238];
const POOL_CREATE_EVENT_DISCRIMINATOR: [u8; 8] = [151, 215, 226, 9, 118, 161, 115, 174];

// --- STRUCTURES D'ÉVÉNEMENTS ON-CHAIN ---

/// Événement de trade du launchpad. `trade_direction` : 0 = achat, 1 = vente.
#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct TradeEvent {
    pub pool_state: Pubkey,
    pub total_base_sell: u64,
    pub virtual_base: u64,
    pub virtual_quote: u64,
    pub real_base_before: u64,
    pub real_quote_before: u64,
    pub real_base_after: u64,
    pub real_quote_after: u64,
    pub amount_in: u64,
    pub amount_out: u64,
    pub protocol_fee: u64,
    pub platform_fee: u64,
    pub share_fee: u64,
    pub trade_direction: u8,
    pub pool_status: u8,
}

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct PoolCreateEvent {
    pub pool_state: Pubkey,
    pub creator: Pubkey,
    pub config: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
}

impl TradeEvent {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("pool_state".to_string(), pubkey_value(&self.pool_state));
        data.insert("total_base_sell".to_string(), u64_value(self.total_base_sell));
        data.insert("virtual_base".to_string(), u64_value(self.virtual_base));
        data.insert("virtual_quote".to_string(), u64_value(self.virtual_quote));
        data.insert("real_base_before".to_string(), u64_value(self.real_base_before));
        data.insert("real_quote_before".to_string(), u64_value(self.real_quote_before));
        data.insert("real_base_after".to_string(), u64_value(self.real_base_after));
        data.insert("real_quote_after".to_string(), u64_value(self.real_quote_after));
        data.insert("amount_in".to_string(), u64_value(self.amount_in));
        data.insert("amount_out".to_string(), u64_value(self.amount_out));
        data.insert("protocol_fee".to_string(), u64_value(self.protocol_fee));
        data.insert("platform_fee".to_string(), u64_value(self.platform_fee));
        data.insert("share_fee".to_string(), u64_value(self.share_fee));
        data.insert("trade_direction".to_string(), Value::from(self.trade_direction));
        data.insert("pool_status".to_string(), Value::from(self.pool_status));
        data
    }
}

impl PoolCreateEvent {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("pool_state".to_string(), pubkey_value(&self.pool_state));
        data.insert("creator".to_string(), pubkey_value(&self.creator));
        data.insert("config".to_string(), pubkey_value(&self.config));
        data.insert("base_mint".to_string(), pubkey_value(&self.base_mint));
        data.insert("quote_mint".to_string(), pubkey_value(&self.quote_mint));
        data
    }
}

fn decode_event(discriminator: &[u8; 8], payload: &[u8]) -> Option<(String, EventData)> {
    match *discriminator {
        TRADE_EVENT_DISCRIMINATOR => TradeEvent::try_from_slice(payload)
            .ok()
            .map(|event| ("TradeEvent".to_string(), event.into_data())),
        POOL_CREATE_EVENT_DISCRIMINATOR => PoolCreateEvent::try_from_slice(payload)
            .ok()
            .map(|event| ("PoolCreateEvent".to_string(), event.into_data())),
        _ => None,
    }
}

fn roles_for(event_name: &str) -> &'static [(usize, &'static str)] {
    match event_name {
        "TradeEvent" => &[
            (0, "payer"),
            (1, "authority"),
            (2, "global_config"),
            (3, "platform_config"),
            (4, "pool_state"),
            (5, "user_base_token"),
            (6, "user_quote_token"),
            (9, "base_mint"),
            (10, "quote_mint"),
        ],
        "PoolCreateEvent" => &[(0, "payer"), (1, "creator"), (2, "global_config")],
        _ => &[],
    }
}

/// Décodeur du launchpad Raydium (pré-migration), événements CPI.
pub struct RaydiumLaunchpadDecoder;

impl ProgramDecoder for RaydiumLaunchpadDecoder {
    fn program(&self) -> ProgramId {
        ProgramId::RaydiumLaunchpad
    }

    fn parse(&self, envelope: &TransactionEnvelope) -> Result<Vec<Event>> {
        let mut ctx = DecodeContext::new(envelope, ProgramId::RaydiumLaunchpad);
        let mut events = Vec::new();

        for payload in inner_instruction_payloads(envelope, 16) {
            let Some((name, mut data)) = decode_cpi_payload(payload, decode_event) else {
                continue;
            };
            if let Some(ix) = primary_instruction(envelope, &RAYDIUM_LAUNCHPAD_PROGRAM_ID) {
                map_instruction_accounts(envelope, ix, roles_for(&name), &mut data);
            }
            events.push(ctx.next_event(&name, data));
        }
        Ok(events)
    }
}
