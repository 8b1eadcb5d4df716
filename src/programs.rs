// DANS : src/programs.rs

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

// --- CATALOGUE DES PROGRAMMES SUPPORTÉS ---
// Adresses trouvées dans les IDL respectifs. Le catalogue est figé pour
// toute la durée de vie du processus.
pub const PUMP_FUN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
pub const PUMP_AMM_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA");
pub const METEORA_DBC_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("dbcij3LWUppWqq96dh6gJWwBifmcGfLSB5D4DuSMaqN");
pub const METEORA_DAMM_V2_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("cpamdpZCGKUy5JxQXB4dcpGPiikHawvSWAd6mEn1sGG");
pub const RAYDIUM_LAUNCHPAD_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("LanMV9sAd7wArD4vJFi2qDdfnVhFxYSUg6eADduJ3uj");
pub const RAYDIUM_CPMM_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C");

// --- AGRÉGATEURS CONNUS ---
// Leur présence dans les comptes d'une transaction attribue l'événement
// à l'agrégateur plutôt qu'à un appel direct.
pub const JUPITER_V6_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");
pub const RAYDIUM_ROUTER_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("routeUGWgWzqBWFcrCfv8tritsqukccJPu3q5GPP3xS");

/// Mint du wrapper SOL natif. Sert de quote mint par défaut.
pub const WSOL_MINT: Pubkey =
    solana_sdk::pubkey!("So11111111111111111111111111111111111111112");

pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Identité symbolique d'un programme supporté.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramId {
    PumpFun,
    PumpAmm,
    MeteoraDbc,
    MeteoraDammV2,
    RaydiumLaunchpad,
    RaydiumCpmm,
}

/// Catégorie d'un programme : avant ou après migration du token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramCategory {
    PreMigration,
    PostMigration,
}

impl ProgramId {
    /// L'ordre de ce tableau est l'ordre d'enregistrement des décodeurs :
    /// il fixe l'ordre de concaténation des événements d'une transaction.
    pub const ALL: [ProgramId; 6] = [
        ProgramId::PumpFun,
        ProgramId::PumpAmm,
        ProgramId::MeteoraDbc,
        ProgramId::MeteoraDammV2,
        ProgramId::RaydiumLaunchpad,
        ProgramId::RaydiumCpmm,
    ];

    pub fn address(&self) -> Pubkey {
        match self {
            ProgramId::PumpFun => PUMP_FUN_PROGRAM_ID,
            ProgramId::PumpAmm => PUMP_AMM_PROGRAM_ID,
            ProgramId::MeteoraDbc => METEORA_DBC_PROGRAM_ID,
            ProgramId::MeteoraDammV2 => METEORA_DAMM_V2_PROGRAM_ID,
            ProgramId::RaydiumLaunchpad => RAYDIUM_LAUNCHPAD_PROGRAM_ID,
            ProgramId::RaydiumCpmm => RAYDIUM_CPMM_PROGRAM_ID,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramId::PumpFun => "pump_fun",
            ProgramId::PumpAmm => "pump_amm",
            ProgramId::MeteoraDbc => "meteora_dbc",
            ProgramId::MeteoraDammV2 => "meteora_damm_v2",
            ProgramId::RaydiumLaunchpad => "raydium_launchpad",
            ProgramId::RaydiumCpmm => "raydium_cpmm",
        }
    }

    pub fn category(&self) -> ProgramCategory {
        match self {
            ProgramId::PumpFun | ProgramId::MeteoraDbc | ProgramId::RaydiumLaunchpad => {
                ProgramCategory::PreMigration
            }
            ProgramId::PumpAmm | ProgramId::MeteoraDammV2 | ProgramId::RaydiumCpmm => {
                ProgramCategory::PostMigration
            }
        }
    }

    /// Index inverse adresse -> identité symbolique.
    pub fn from_address(address: &Pubkey) -> Option<ProgramId> {
        ProgramId::ALL.iter().copied().find(|p| p.address() == *address)
    }
}

/// Tag de l'agrégateur connu présent à cette adresse, s'il y en a un.
pub fn aggregator_tag(address: &Pubkey) -> Option<&'static str> {
    if *address == JUPITER_V6_PROGRAM_ID {
        Some("jupiter")
    } else if *address == RAYDIUM_ROUTER_PROGRAM_ID {
        Some("raydium")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_round_trip() {
        for program in ProgramId::ALL {
            assert_eq!(ProgramId::from_address(&program.address()), Some(program));
        }
        assert_eq!(ProgramId::from_address(&WSOL_MINT), None);
    }

    #[test]
    fn program_id_serde_uses_snake_case() {
        let json = serde_json::to_string(&ProgramId::MeteoraDammV2).unwrap();
        assert_eq!(json, "\"meteora_damm_v2\"");
        let back: ProgramId = serde_json::from_str("\"raydium_launchpad\"").unwrap();
        assert_eq!(back, ProgramId::RaydiumLaunchpad);
    }

    #[test]
    fn aggregator_catalog_is_orthogonal() {
        assert_eq!(aggregator_tag(&JUPITER_V6_PROGRAM_ID), Some("jupiter"));
        assert_eq!(aggregator_tag(&RAYDIUM_ROUTER_PROGRAM_ID), Some("raydium"));
        assert_eq!(aggregator_tag(&PUMP_FUN_PROGRAM_ID), None);
    }
}
