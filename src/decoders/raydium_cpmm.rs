// DANS : src/decoders/raydium_cpmm.rs

use anyhow::Result;
use borsh::{BorshDeserialize, BorshSerialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;

use crate::decoders::context::{
    decode_cpi_payload, infer_token_mints, inner_instruction_payloads, DecodeContext,
};
use crate::decoders::ProgramDecoder;
use crate::envelope::TransactionEnvelope;
use crate::events::{pubkey_value, u64_value, Event, EventData};
use crate::programs::ProgramId;

pub const SWAP_EVENT_DISCRIMINATOR: [u8; 8] = [64, 198, 205, 232, 38, 8, 113, 226];
const LP_CHANGE_EVENT_DISCRIMINATOR: [u8; 8] = [121, 163, 205, 201, 57, 218, 117, 60];

/// Événement de swap du CPMM Raydium. `base_input` indique le sens.
#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct SwapEvent {
    pub pool_id: Pubkey,
    pub input_vault_before: u64,
    pub output_vault_before: u64,
    pub input_amount: u64,
    pub output_amount: u64,
    pub input_transfer_fee: u64,
    pub output_transfer_fee: u64,
    pub base_input: bool,
}

impl SwapEvent {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("pool_id".to_string(), pubkey_value(&self.pool_id));
        data.insert("pool".to_string(), pubkey_value(&self.pool_id));
        data.insert("input_vault_before".to_string(), u64_value(self.input_vault_before));
        data.insert("output_vault_before".to_string(), u64_value(self.output_vault_before));
        data.insert("input_amount".to_string(), u64_value(self.input_amount));
        data.insert("output_amount".to_string(), u64_value(self.output_amount));
        data.insert("input_transfer_fee".to_string(), u64_value(self.input_transfer_fee));
        data.insert("output_transfer_fee".to_string(), u64_value(self.output_transfer_fee));
        data.insert("base_input".to_string(), Value::Bool(self.base_input));
        data
    }
}

/// Dépôt ou retrait de liquidité. `lp_amount_change` est signé par
/// `is_deposit` plutôt que par le signe du montant.
#[derive(BorshDeserialize, BorshSerialize, Debug)]
pub struct LpChangeEvent {
    pub pool_id: Pubkey,
    pub lp_amount_before: u64,
    pub token_0_vault_before: u64,
    pub token_1_vault_before: u64,
    pub token_0_amount: u64,
    pub token_1_amount: u64,
    pub token_0_transfer_fee: u64,
    pub token_1_transfer_fee: u64,
    pub change_type: u8,
}

impl LpChangeEvent {
    fn into_data(self) -> EventData {
        let mut data = EventData::new();
        data.insert("pool_id".to_string(), pubkey_value(&self.pool_id));
        data.insert("pool".to_string(), pubkey_value(&self.pool_id));
        data.insert("lp_amount_before".to_string(), u64_value(self.lp_amount_before));
        data.insert("token_0_vault_before".to_string(), u64_value(self.token_0_vault_before));
        data.insert("token_1_vault_before".to_string(), u64_value(self.token_1_vault_before));
        data.insert("token_0_amount".to_string(), u64_value(self.token_0_amount));
        data.insert("token_1_amount".to_string(), u64_value(self.token_1_amount));
        data.insert("token_0_transfer_fee".to_string(), u64_value(self.token_0_transfer_fee));
        data.insert("token_1_transfer_fee".to_string(), u64_value(self.token_1_transfer_fee));
        data.insert("change_type".to_string(), Value::from(self.change_type));
        data
    }
}

fn decode_event(discriminator: &[u8; 8], payload: &[u8]) -> Option<(String, EventData)> {
    match *discriminator {
        SWAP_EVENT_DISCRIMINATOR => SwapEvent::try_from_slice(payload)
            .ok()
            .map(|event| ("SwapEvent".to_string(), event.into_data())),
        LP_CHANGE_EVENT_DISCRIMINATOR => LpChangeEvent::try_from_slice(payload)
            .ok()
            .map(|event| ("LpChangeEvent".to_string(), event.into_data())),
        _ => None,
    }
}

/// Décodeur du CPMM Raydium (post-migration), événements CPI.
pub struct RaydiumCpmmDecoder;

impl ProgramDecoder for RaydiumCpmmDecoder {
    fn program(&self) -> ProgramId {
        ProgramId::RaydiumCpmm
    }

    fn parse(&self, envelope: &TransactionEnvelope) -> Result<Vec<Event>> {
        let mut ctx = DecodeContext::new(envelope, ProgramId::RaydiumCpmm);
        let mut events = Vec::new();

        for payload in inner_instruction_payloads(envelope, 16) {
            let Some((name, mut data)) = decode_cpi_payload(payload, decode_event) else {
                continue;
            };
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{CompiledIx, InnerIxGroup, TokenBalance};
    use crate::programs::{RAYDIUM_CPMM_PROGRAM_ID, RAYDIUM_LAUNCHPAD_PROGRAM_ID, WSOL_MINT};

    #[test]
    fn decodes_swap_and_infers_mints() {
        let event = SwapEvent {
            pool_id: WSOL_MINT,
            input_vault_before: 1_000,
            output_vault_before: 2_000,
            input_amount: 100,
            output_amount: 90,
            input_transfer_fee: 0,
            output_transfer_fee: 0,
            base_input: true,
        };
        let mut data = SWAP_EVENT_DISCRIMINATOR.to_vec();
        data.extend(event.try_to_vec().unwrap());
        let envelope = TransactionEnvelope {
            signature: "sig".to_string(),
            account_keys: vec![WSOL_MINT, RAYDIUM_CPMM_PROGRAM_ID],
            inner_instructions: vec![InnerIxGroup {
                outer_index: 0,
                instructions: vec![CompiledIx { program_id_index: 1, accounts: vec![], data }],
            }],
            post_token_balances: vec![
                TokenBalance { mint: RAYDIUM_LAUNCHPAD_PROGRAM_ID.to_string(), ..Default::default() },
                TokenBalance { mint: WSOL_MINT.to_string(), ..Default::default() },
            ],
            ..Default::default()
        };

        let events = RaydiumCpmmDecoder.parse(&envelope).unwrap();
        assert_eq!(events.len(), 1);
        let data = &events[0].data;
        assert_eq!(events[0].name, "SwapEvent");
        assert_eq!(data["base_input"], Value::Bool(true));
        assert_eq!(data["token_mint"], Value::String(RAYDIUM_LAUNCHPAD_PROGRAM_ID.to_string()));
        assert_eq!(data["quote_mint"], Value::String(WSOL_MINT.to_string()));
    }

    #[test]
    fn decodes_lp_change_event() {
        let event = LpChangeEvent {
            pool_id: WSOL_MINT,
            lp_amount_before: 1_000,
            token_0_vault_before: 10,
            token_1_vault_before: 20,
            token_0_amount: 5,
            token_1_amount: 6,
            token_0_transfer_fee: 0,
            token_1_transfer_fee: 0,
            change_type: 0,
        };
        let mut data = LP_CHANGE_EVENT_DISCRIMINATOR.to_vec();
        data.extend(event.try_to_vec().unwrap());
        let envelope = TransactionEnvelope {
            signature: "sig".to_string(),
            account_keys: vec![WSOL_MINT, RAYDIUM_CPMM_PROGRAM_ID],
            inner_instructions: vec![InnerIxGroup {
                outer_index: 0,
                instructions: vec![CompiledIx { program_id_index: 1, accounts: vec![], data }],
            }],
            ..Default::default()
        };
        let events = RaydiumCpmmDecoder.parse(&envelope).unwrap();
        assert_eq!(events[0].name, "LpChangeEvent");
        assert_eq!(events[0].data["token_0_amount"], Value::String("5".into()));
    }
}
