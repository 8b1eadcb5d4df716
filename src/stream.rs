// DANS : src/stream.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::sink::SinkExt;
use solana_sdk::pubkey::Pubkey;
use tokio_stream::StreamExt;
use tracing::{error, info};
use yellowstone_grpc_client::GeyserGrpcClient;
use yellowstone_grpc_proto::prelude::{
    subscribe_update::UpdateOneof, CommitmentLevel, SubscribeRequest,
    SubscribeRequestFilterBlocksMeta, SubscribeRequestFilterTransactions,
    SubscribeUpdateTransaction,
};

use crate::config::Config;
use crate::engine::PipelineEngine;
use crate::envelope::{CompiledIx, InnerIxGroup, TokenBalance, TransactionEnvelope};
use crate::programs::ProgramId;

/// Boucle de consommation du flux Geyser. En cas d'erreur, on journalise
/// et on se reconnecte après une pause de 5 s; la reprise est la
/// responsabilité de cette boucle externe.
pub async fn run(engine: Arc<PipelineEngine>, config: &Config) {
    loop {
        if let Err(e) = subscribe_and_process(&engine, config).await {
            error!("[Stream] Le flux a planté : {:?}. Reconnexion dans 5s...", e);
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }
}

fn subscribe_request() -> SubscribeRequest {
    // On ne demande que les transactions impliquant le catalogue, plus les
    // métadonnées de bloc : le flux transaction ne porte pas le blockTime,
    // on le corrèle par slot depuis les updates BlockMeta.
    let programs_to_watch: Vec<String> =
        ProgramId::ALL.iter().map(|p| p.address().to_string()).collect();

    SubscribeRequest {
        transactions: HashMap::from([(
            "txs".to_string(),
            SubscribeRequestFilterTransactions {
                vote: Some(false),
                failed: Some(false),
                account_include: vec![],
                account_required: programs_to_watch,
                account_exclude: vec![],
                signature: None,
            },
        )]),
        blocks_meta: HashMap::from([(
            "blocks".to_string(),
            SubscribeRequestFilterBlocksMeta::default(),
        )]),
        commitment: Some(CommitmentLevel::Processed as i32),
        ..Default::default()
    }
}

/// Cache borné des blockTime récents, indexé par slot, alimenté par les
/// updates BlockMeta de l'abonnement.
pub struct BlockTimeCache {
    by_slot: BTreeMap<u64, i64>,
    capacity: usize,
}

impl BlockTimeCache {
    pub fn new(capacity: usize) -> Self {
        Self { by_slot: BTreeMap::new(), capacity }
    }

    pub fn insert(&mut self, slot: u64, block_time: i64) {
        self.by_slot.insert(slot, block_time);
        while self.by_slot.len() > self.capacity {
            let oldest = *self.by_slot.keys().next().expect("cache non vide");
            self.by_slot.remove(&oldest);
        }
    }

    /// blockTime du slot, sinon celui du slot connu le plus proche — la méta
    /// d'un bloc peut arriver après les transactions de ce bloc. 0 tant que
    /// rien n'est connu.
    pub fn resolve(&self, slot: u64) -> i64 {
        if let Some(time) = self.by_slot.get(&slot) {
            return *time;
        }
        let before = self.by_slot.range(..slot).next_back().map(|(_, time)| *time);
        let after = self.by_slot.range(slot..).next().map(|(_, time)| *time);
        before.or(after).unwrap_or(0)
    }
}

async fn subscribe_and_process(engine: &Arc<PipelineEngine>, config: &Config) -> Result<()> {
    info!("[Stream] Connexion au flux Geyser gRPC : {}", config.geyser_grpc_url);
    let mut client = GeyserGrpcClient::build_from_shared(config.geyser_grpc_url.clone())?
        .connect()
        .await
        .context("Impossible de se connecter au client Geyser gRPC")?;

    let (mut subscribe_tx, mut stream) = client.subscribe().await?;
    subscribe_tx.send(subscribe_request()).await?;
    info!("[Stream] Abonnement réussi. En attente du flux de transactions...");

    let mut block_times = BlockTimeCache::new(512);

    while let Some(message_result) = stream.next().await {
        let message = message_result.context("Erreur dans le stream Geyser")?;
        match message.update_oneof {
            Some(UpdateOneof::BlockMeta(meta)) => {
                if let Some(time) = meta.block_time {
                    block_times.insert(meta.slot, time.timestamp);
                }
            }
            Some(UpdateOneof::Transaction(update)) => {
                let block_time = block_times.resolve(update.slot);
                if let Some(envelope) = envelope_from_update(update, block_time) {
                    engine.process_transaction(&envelope).await;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn pubkeys_from_bytes(raw: &[Vec<u8>]) -> Vec<Pubkey> {
    raw.iter()
        .filter_map(|bytes| Pubkey::try_from(bytes.as_slice()).ok())
        .collect()
}

/// Construit l'enveloppe interne depuis l'update Geyser : comptes statiques
/// puis adresses chargées des lookup tables (writable puis readonly),
/// instructions, instructions internes, logs et soldes de tokens.
/// `block_time` vient des updates BlockMeta, résolu par slot par l'appelant.
pub fn envelope_from_update(
    update: SubscribeUpdateTransaction,
    block_time: i64,
) -> Option<TransactionEnvelope> {
    let info = update.transaction?;
    let meta = info.meta?;
    let message = info.transaction.as_ref()?.message.as_ref()?;

    let mut account_keys = pubkeys_from_bytes(&message.account_keys);
    account_keys.extend(pubkeys_from_bytes(&meta.loaded_writable_addresses));
    account_keys.extend(pubkeys_from_bytes(&meta.loaded_readonly_addresses));

    let instructions = message
        .instructions
        .iter()
        .map(|ix| CompiledIx {
            program_id_index: ix.program_id_index as u8,
            accounts: ix.accounts.clone(),
            data: ix.data.clone(),
        })
        .collect();

    let inner_instructions = meta
        .inner_instructions
        .iter()
        .map(|group| InnerIxGroup {
            outer_index: group.index as u8,
            instructions: group
                .instructions
                .iter()
                .map(|ix| CompiledIx {
                    program_id_index: ix.program_id_index as u8,
                    accounts: ix.accounts.clone(),
                    data: ix.data.clone(),
                })
                .collect(),
        })
        .collect();

    let token_balances = |balances: &[yellowstone_grpc_proto::prelude::TokenBalance]| {
        balances
            .iter()
            .map(|balance| TokenBalance {
                account_index: balance.account_index as u8,
                mint: balance.mint.clone(),
                owner: balance.owner.clone(),
                amount: balance
                    .ui_token_amount
                    .as_ref()
                    .map(|amount| amount.amount.clone())
                    .unwrap_or_default(),
                decimals: balance
                    .ui_token_amount
                    .as_ref()
                    .map(|amount| amount.decimals as u8)
                    .unwrap_or_default(),
            })
            .collect()
    };

    Some(TransactionEnvelope {
        signature: bs58::encode(&info.signature).into_string(),
        slot: update.slot,
        block_time,
        account_keys,
        instructions,
        inner_instructions,
        log_messages: meta.log_messages.clone(),
        pre_token_balances: token_balances(&meta.pre_token_balances),
        post_token_balances: token_balances(&meta.post_token_balances),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_resolves_exact_slot_first() {
        let mut cache = BlockTimeCache::new(8);
        cache.insert(100, 1_700_000_000);
        cache.insert(101, 1_700_000_001);
        assert_eq!(cache.resolve(101), 1_700_000_001);
    }

    #[test]
    fn cache_falls_back_to_nearest_known_slot() {
        let mut cache = BlockTimeCache::new(8);
        cache.insert(100, 1_700_000_000);
        // Méta du slot 102 pas encore arrivée : on prend le slot antérieur.
        assert_eq!(cache.resolve(102), 1_700_000_000);
        // Transaction d'un slot antérieur à tout ce qui est connu.
        assert_eq!(cache.resolve(50), 1_700_000_000);
        // Rien de connu : 0.
        assert_eq!(BlockTimeCache::new(8).resolve(100), 0);
    }

    #[test]
    fn cache_is_bounded_and_evicts_oldest() {
        let mut cache = BlockTimeCache::new(2);
        cache.insert(100, 1);
        cache.insert(101, 2);
        cache.insert(102, 3);
        // Le slot 100 est évincé mais reste résolu par proximité.
        assert_eq!(cache.resolve(100), 2);
        assert_eq!(cache.resolve(102), 3);
    }
}
