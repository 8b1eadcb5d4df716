// DANS : src/decoders/meteora_damm_v2.rs

use anyhow::Result;
use borsh::{BorshDeserialize, BorshSerialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;

use crate::decoders::context::{
    decode_cpi_payload, flatten_first_level, infer_token_mints, inner_instruction_payloads,
    DecodeContext,
};
use crate::decoders::ProgramDecoder;
use crate::envelope::TransactionEnvelope;
use crate::events::{pubkey_value, u128_value, u64_value, Event, EventData};
use crate::programs::ProgramId;

// --- DISCRIMINATEURS D'ÉVÉNEMENTS ---
pub const EVT_SWAP2_DISCRIMINATOR: [u8; 8] = [189, 66, 51, 168, 38, 80, 117, 153];
const EVT_INITIALIZE_POOL_DISCRIMINATOR: [u8; 8] = [228, 50, 246, 85, 203, 66, 134, 37];
const EVT_ADD_LIQUIDITY_DISCRIMINATOR: [u8; 8] = [175, 242, 8, 157, 30, 247, 185, 169];
const EVT_REMOVE_LIQUIDITY_DISCRIMINATOR: [u8; 8] = [87, 46, 88, 98, 175, 96, 34, 91];

// --- STRUCTURES D'ÉVÉNEMENTS ON-CHAIN ---

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct SwapParameters2 {
    pub amount_in: u64,
    pub minimum_amount_out: u64,
}

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct SwapResult2 {
    pub output_amount: u64,
    pub next_sqrt_price: u128,
    pub lp_fee: u64,
    pub protocol_fee: u64,
    pub partner_fee: u64,
    pub referral_fee: u64,
}

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct EvtSwap2 {
    pub pool: Pubkey,
    pub trade_direction: u8,
    pub has_referral: bool,
    pub params: SwapParameters2,
    pub swap_result: SwapResult2,
    pub actual_amount_in: u64,
    pub current_timestamp: u64,
}

#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct EvtInitializePool {
    pub pool: Pubkey,
    pub token_a_mint: Pubkey,
    pub token_b_mint: Pubkey,
    pub creator: Pubkey,
    pub payer: Pubkey,
    pub liquidity: u128,
    pub sqrt_price: u128,
    pub activation_point: u64,
}

impl EvtSwap2 {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("pool".to_string(), pubkey_value(&self.pool));
        data.insert("trade_direction".to_string(), Value::from(self.trade_direction));
        data.insert("has_referral".to_string(), Value::Bool(self.has_referral));
        let mut params = EventData::new();
        params.insert("amount_in".to_string(), u64_value(self.params.amount_in));
        params.insert("minimum_amount_out".to_string(), u64_value(self.params.minimum_amount_out));
        data.insert("params".to_string(), Value::Object(params));
        let mut result = EventData::new();
        result.insert("output_amount".to_string(), u64_value(self.swap_result.output_amount));
        result.insert("next_sqrt_price".to_string(), u128_value(self.swap_result.next_sqrt_price));
        result.insert("lp_fee".to_string(), u64_value(self.swap_result.lp_fee));
        result.insert("protocol_fee".to_string(), u64_value(self.swap_result.protocol_fee));
        result.insert("partner_fee".to_string(), u64_value(self.swap_result.partner_fee));
        result.insert("referral_fee".to_string(), u64_value(self.swap_result.referral_fee));
        data.insert("swap_result".to_string(), Value::Object(result));
        data.insert("actual_amount_in".to_string(), u64_value(self.actual_amount_in));
        data.insert("current_timestamp".to_string(), u64_value(self.current_timestamp));
        flatten_first_level(&mut data);
        data
    }
}

impl EvtInitializePool {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("pool".to_string(), pubkey_value(&self.pool));
        data.insert("token_a_mint".to_string(), pubkey_value(&self.token_a_mint));
        data.insert("token_b_mint".to_string(), pubkey_value(&self.token_b_mint));
        data.insert("creator".to_string(), pubkey_value(&self.creator));
        data.insert("payer".to_string(), pubkey_value(&self.payer));
        data.insert("liquidity".to_string(), u128_value(self.liquidity));
        data.insert("sqrt_price".to_string(), u128_value(self.sqrt_price));
        data.insert("activation_point".to_string(), u64_value(self.activation_point));
        data
    }
}

/// Mouvement de liquidité, même layout pour l'ajout et le retrait.
#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct EvtLiquidityChange {
    pub pool: Pubkey,
    pub position: Pubkey,
    pub owner: Pubkey,
    pub liquidity_delta: u128,
    pub token_a_amount: u64,
    pub token_b_amount: u64,
    pub total_amount_a: u64,
    pub total_amount_b: u64,
}

impl EvtLiquidityChange {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("pool".to_string(), pubkey_value(&self.pool));
        data.insert("position".to_string(), pubkey_value(&self.position));
        data.insert("owner".to_string(), pubkey_value(&self.owner));
        data.insert("liquidity_delta".to_string(), u128_value(self.liquidity_delta));
        data.insert("token_a_amount".to_string(), u64_value(self.token_a_amount));
        data.insert("token_b_amount".to_string(), u64_value(self.token_b_amount));
        data.insert("total_amount_a".to_string(), u64_value(self.total_amount_a));
        data.insert("total_amount_b".to_string(), u64_value(self.total_amount_b));
        data
    }
}

fn decode_event(discriminator: &[u8; 8], payload: &[u8]) -> Option<(String, EventData)> {
    match *discriminator {
        EVT_SWAP2_DISCRIMINATOR => EvtSwap2::try_from_slice(payload)
            .ok()
            .map(|event| ("EvtSwap2".to_string(), event.into_data())),
        EVT_INITIALIZE_POOL_DISCRIMINATOR => EvtInitializePool::try_from_slice(payload)
            .ok()
            .map(|event| ("EvtInitializePool".to_string(), event.into_data())),
        EVT_ADD_LIQUIDITY_DISCRIMINATOR => EvtLiquidityChange::try_from_slice(payload)
            .ok()
            .map(|event| ("EvtAddLiquidity".to_string(), event.into_data())),
        EVT_REMOVE_LIQUIDITY_DISCRIMINATOR => EvtLiquidityChange::try_from_slice(payload)
            .ok()
            .map(|event| ("EvtRemoveLiquidity".to_string(), event.into_data())),
        _ => None,
    }
}

/// Décodeur de l'AMM dynamique Meteora v2 (post-migration), événements CPI.
pub struct MeteoraDammV2Decoder;

impl ProgramDecoder for MeteoraDammV2Decoder {
    fn program(&self) -> ProgramId {
        ProgramId::MeteoraDammV2
    }

    fn parse(&self, envelope: &TransactionEnvelope) -> Result<Vec<Event>> {
        let mut ctx = DecodeContext::new(envelope, ProgramId::MeteoraDammV2);
        let mut events = Vec::new();

        for payload in inner_instruction_payloads(envelope, 16) {
            let Some((name, mut data)) = decode_cpi_payload(payload, decode_event) else {
                continue;
            };
            // EvtSwap2 ne porte pas les mints : on les infère des soldes.
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
