// src/decoders/mod.rs

use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::Result;
use solana_sdk::pubkey::Pubkey;
use tracing::warn;

use crate::envelope::TransactionEnvelope;
use crate::events::Event;
use crate::monitoring::metrics::DECODER_ERRORS;
use crate::programs::ProgramId;

// --- 1. Déclarer les modules ---
pub mod context;
pub mod pump_fun;
pub mod pump_amm;
pub mod meteora_dbc;
pub mod meteora_damm_v2;
pub mod raydium_launchpad;
pub mod raydium_cpmm;

// --- 2. Le contrat commun à tous les décodeurs ---

/// Un décodeur transforme une enveloppe de transaction en zéro ou plusieurs
/// événements pour SON programme. Les décodeurs sont sans état après
/// construction et sûrs pour des appels `parse` concurrents.
pub trait ProgramDecoder: Send + Sync {
    fn program(&self) -> ProgramId;

    fn program_address(&self) -> Pubkey {
        self.program().address()
    }

    /// Décode l'enveloppe. Une erreur remontée ici est confinée au décodeur
    /// par le registre : elle ne vaut jamais abandon de la transaction.
    fn parse(&self, envelope: &TransactionEnvelope) -> Result<Vec<Event>>;
}

// --- 3. Le registre ---

/// Registre des décodeurs, indexé par adresse de programme au démarrage.
/// L'ordre d'enregistrement fixe l'ordre de concaténation des événements.
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn ProgramDecoder>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self { decoders: Vec::new() }
    }

    /// Registre complet : les six programmes du catalogue, dans l'ordre
    /// de `ProgramId::ALL`.
    pub fn with_catalog() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(pump_fun::PumpFunDecoder));
        registry.register(Box::new(pump_amm::PumpAmmDecoder));
        registry.register(Box::new(meteora_dbc::MeteoraDbcDecoder));
        registry.register(Box::new(meteora_damm_v2::MeteoraDammV2Decoder));
        registry.register(Box::new(raydium_launchpad::RaydiumLaunchpadDecoder));
        registry.register(Box::new(raydium_cpmm::RaydiumCpmmDecoder));
        registry
    }

    pub fn register(&mut self, decoder: Box<dyn ProgramDecoder>) {
        self.decoders.push(decoder);
    }

    /// Invoque chaque décodeur impliqué et concatène les résultats.
    /// Isolation par décodeur : erreur ou panique ne produit qu'une liste
    /// vide pour CE décodeur, comptée dans les métriques.
    pub fn parse(&self, envelope: &TransactionEnvelope) -> Vec<Event> {
        let mut events = Vec::new();
        for decoder in &self.decoders {
            if !envelope.involves(&decoder.program_address()) {
                continue;
            }
            let program = decoder.program();
            match catch_unwind(AssertUnwindSafe(|| decoder.parse(envelope))) {
                Ok(Ok(decoded)) => events.extend(decoded),
                Ok(Err(e)) => {
                    DECODER_ERRORS.with_label_values(&[program.as_str()]).inc();
                    warn!(
                        "[Decoders] Échec du décodeur {} sur {} : {:#}",
                        program.as_str(),
                        envelope.signature,
                        e
                    );
                }
                Err(_) => {
                    DECODER_ERRORS.with_label_values(&[program.as_str()]).inc();
                    warn!(
                        "[Decoders] Panique du décodeur {} sur {}",
                        program.as_str(),
                        envelope.signature
                    );
                }
            }
        }
        events
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_catalog()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::pump_fun::{PumpFunDecoder, TradeEvent, TRADE_EVENT_DISCRIMINATOR};
    use crate::programs::PUMP_FUN_PROGRAM_ID;
    use borsh::BorshSerialize;

    struct PanickingDecoder;
    impl ProgramDecoder for PanickingDecoder {
        fn program(&self) -> ProgramId {
            ProgramId::RaydiumCpmm
        }
        fn program_address(&self) -> Pubkey {
            // Même adresse que pump_fun pour être invoqué sur la même enveloppe.
            PUMP_FUN_PROGRAM_ID
        }
        fn parse(&self, _envelope: &TransactionEnvelope) -> Result<Vec<Event>> {
            panic!("boom");
        }
    }

    fn trade_envelope() -> TransactionEnvelope {
        let event = TradeEvent {
            mint: crate::programs::WSOL_MINT,
            sol_amount: 1_000_000_000,
            token_amount: 5_000_000,
            is_buy: true,
            user: PUMP_FUN_PROGRAM_ID,
            timestamp: 1_700_000_000,
            virtual_sol_reserves: 30_000_000_000,
            virtual_token_reserves: 1_000_000_000_000,
            real_sol_reserves: 0,
            real_token_reserves: 0,
        };
        let mut payload = TRADE_EVENT_DISCRIMINATOR.to_vec();
        payload.extend(event.try_to_vec().unwrap());
        TransactionEnvelope {
            signature: "sig".to_string(),
            account_keys: vec![crate::programs::WSOL_MINT, PUMP_FUN_PROGRAM_ID],
            log_messages: vec![
                format!("Program {} invoke [1]", PUMP_FUN_PROGRAM_ID),
                format!("Program data: {}", base64::encode(&payload)),
                format!("Program {} success", PUMP_FUN_PROGRAM_ID),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn panicking_decoder_does_not_affect_others() {
        let envelope = trade_envelope();

        let mut registry = DecoderRegistry::new();
        registry.register(Box::new(PanickingDecoder));
        registry.register(Box::new(PumpFunDecoder));
        let with_panic = registry.parse(&envelope);

        let mut clean = DecoderRegistry::new();
        clean.register(Box::new(PumpFunDecoder));
        let without_panic = clean.parse(&envelope);

        assert_eq!(with_panic.len(), 1);
        assert_eq!(with_panic.len(), without_panic.len());
        assert_eq!(with_panic[0].id, without_panic[0].id);
        assert_eq!(with_panic[0].data, without_panic[0].data);
    }

    #[test]
    fn uninvolved_decoders_are_skipped() {
        let envelope = TransactionEnvelope {
            signature: "sig".to_string(),
            account_keys: vec![crate::programs::WSOL_MINT],
            ..Default::default()
        };
        let registry = DecoderRegistry::with_catalog();
        assert!(registry.parse(&envelope).is_empty());
    }
}
