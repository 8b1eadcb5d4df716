// DANS : src/envelope.rs

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

// --- STRUCTURES MIROIRS DE LA TRANSACTION ---
// Porteur opaque construit depuis l'update Geyser. Le cœur du runtime ne
// fait que le lire, jamais le modifier.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompiledIx {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// Groupe d'instructions internes rattaché à une instruction de premier niveau.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InnerIxGroup {
    pub outer_index: u8,
    pub instructions: Vec<CompiledIx>,
}

/// Solde de token d'un compte, avant ou après la transaction.
/// `amount` est le montant brut en chaîne décimale, tel que fourni par le flux.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenBalance {
    pub account_index: u8,
    pub mint: String,
    pub owner: String,
    pub amount: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub signature: String,
    pub slot: u64,
    pub block_time: i64,
    /// Fee payer en tête, puis le reste des comptes statiques, puis les
    /// adresses résolues depuis les lookup tables (writable puis readonly).
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<CompiledIx>,
    pub inner_instructions: Vec<InnerIxGroup>,
    pub log_messages: Vec<String>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
}

impl TransactionEnvelope {
    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.account_keys.first()
    }

    /// Test d'implication : le programme apparaît-il dans l'ensemble complet
    /// des comptes (lookup tables comprises) ?
    pub fn involves(&self, program: &Pubkey) -> bool {
        self.account_keys.iter().any(|key| key == program)
    }

    pub fn account_at(&self, index: usize) -> Option<&Pubkey> {
        self.account_keys.get(index)
    }

    /// Programme invoqué par une instruction compilée, si l'index est valide.
    pub fn program_of(&self, ix: &CompiledIx) -> Option<&Pubkey> {
        self.account_at(ix.program_id_index as usize)
    }
}
