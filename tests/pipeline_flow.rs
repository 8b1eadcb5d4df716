// Parcours de bout en bout : enveloppe -> décodage -> appariement ->
// filtre -> transformation -> diffusion temps réel.

use std::sync::Arc;
use std::time::Duration;

use borsh::BorshSerialize;
use serde_json::Value;

use tada::decoders::pump_fun::{TradeEvent, TRADE_EVENT_DISCRIMINATOR};
use tada::decoders::DecoderRegistry;
use tada::delivery::realtime::RealtimeBus;
use tada::delivery::Dispatcher;
use tada::engine::PipelineEngine;
use tada::envelope::TransactionEnvelope;
use tada::pipeline::index::PipelineIndex;
use tada::pipeline::transform::{TemplateKind, Transform};
use tada::pipeline::{Destinations, Filter, Pipeline, PipelineStatus};
use tada::programs::{ProgramId, PUMP_FUN_PROGRAM_ID, WSOL_MINT};

fn trade_envelope(sol_amount: u64, is_buy: bool) -> TransactionEnvelope {
    let event = TradeEvent {
        mint: WSOL_MINT,
        sol_amount,
        token_amount: 5_000_000,
        is_buy,
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
        signature: "5igSig".to_string(),
        slot: 42,
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

fn whale_pipeline(id: &str) -> Pipeline {
    let filter: Filter = serde_json::from_value(serde_json::json!({
        "isBuy": true,
        "solAmount": { "min": 10.0 }
    }))
    .unwrap();
    Pipeline {
        id: id.to_string(),
        name: "gros achats".to_string(),
        api_key: "key".to_string(),
        programs: vec![ProgramId::PumpFun],
        filter,
        transform: Transform::Template { template: TemplateKind::Trade },
        destinations: Destinations {
            realtime: Some(tada::delivery::realtime::RealtimeConfig { enabled: true }),
            ..Default::default()
        },
        status: PipelineStatus::Active,
        created_at: 0,
        updated_at: 0,
    }
}

fn engine_with_bus() -> (Arc<PipelineEngine>, Arc<RealtimeBus>) {
    let bus = Arc::new(RealtimeBus::new(32));
    let dispatcher = Dispatcher::new(Duration::from_secs(1), Some(bus.clone()));
    let engine = PipelineEngine::new(
        DecoderRegistry::with_catalog(),
        Arc::new(PipelineIndex::new()),
        dispatcher,
    );
    (Arc::new(engine), bus)
}

#[tokio::test]
async fn matched_event_reaches_realtime_subscriber() {
    let (engine, bus) = engine_with_bus();
    engine.upsert_pipeline(whale_pipeline("p1")).unwrap();
    let mut subscriber = bus.subscribe_pipeline("p1");

    engine.process_transaction(&trade_envelope(20_000_000_000, true)).await;

    let message = subscriber.try_recv().expect("un message attendu");
    assert_eq!(message.payload["pipelineId"], Value::String("p1".into()));
    assert_eq!(message.payload["type"], Value::String("event".into()));
    assert_eq!(message.payload["direction"], Value::String("buy".into()));
    assert_eq!(message.payload["solAmount"], Value::from(20.0));
    assert_eq!(message.payload["program"], Value::String("pump_fun".into()));
    // Un seul enregistrement par sortie.
    assert!(subscriber.try_recv().is_err());
}

#[tokio::test]
async fn filtered_event_is_not_delivered() {
    let (engine, bus) = engine_with_bus();
    engine.upsert_pipeline(whale_pipeline("p1")).unwrap();
    let mut subscriber = bus.subscribe_pipeline("p1");

    // Une vente sous le seuil : rejetée par le filtre.
    engine.process_transaction(&trade_envelope(1_000_000_000, false)).await;

    assert!(subscriber.try_recv().is_err());
}

#[tokio::test]
async fn paused_pipeline_sees_nothing() {
    let (engine, bus) = engine_with_bus();
    let mut paused = whale_pipeline("p1");
    paused.status = PipelineStatus::Paused;
    engine.upsert_pipeline(paused).unwrap();
    let mut subscriber = bus.subscribe_pipeline("p1");

    engine.process_transaction(&trade_envelope(20_000_000_000, true)).await;

    assert!(subscriber.try_recv().is_err());
}

#[tokio::test]
async fn each_matched_pipeline_gets_its_own_record() {
    let (engine, bus) = engine_with_bus();
    engine.upsert_pipeline(whale_pipeline("p1")).unwrap();
    let mut open = whale_pipeline("p2");
    open.filter = Filter::default();
    engine.upsert_pipeline(open).unwrap();

    let mut first = bus.subscribe_pipeline("p1");
    let mut second = bus.subscribe_pipeline("p2");

    engine.process_transaction(&trade_envelope(20_000_000_000, true)).await;

    assert!(first.try_recv().is_ok());
    let message = second.try_recv().unwrap();
    assert_eq!(message.payload["pipelineId"], Value::String("p2".into()));
}
