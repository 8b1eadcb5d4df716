// DANS : src/delivery/realtime.rs

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use warp::ws::{Message, WebSocket};
use warp::Filter;

use crate::events::{EventData, OutputRecord};
use crate::monitoring::metrics::REALTIME_SUBSCRIBERS;

fn default_true() -> bool {
    true
}

/// La destination temps réel n'a pas de configuration propre : le bus est
/// local au processus et les abonnements arrivent côté client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Message `event` poussé aux abonnés d'une room `pipeline:{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeMessage {
    pub room: String,
    pub payload: Value,
}

/// Bus pub/sub local au processus. Un émetteur (le dispatcher), plusieurs
/// abonnés par room. Les files sont bornées : un abonné lent saute les
/// messages les plus anciens, il ne bloque jamais l'émetteur.
pub struct RealtimeBus {
    rooms: RwLock<HashMap<String, broadcast::Sender<RealtimeMessage>>>,
    capacity: usize,
}

impl RealtimeBus {
    pub fn new(capacity: usize) -> Self {
        Self { rooms: RwLock::new(HashMap::new()), capacity }
    }

    fn room_name(pipeline_id: &str) -> String {
        format!("pipeline:{}", pipeline_id)
    }

    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<RealtimeMessage> {
        let mut rooms = self.rooms.write().expect("verrou rooms empoisonné");
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscribe_pipeline(&self, pipeline_id: &str) -> broadcast::Receiver<RealtimeMessage> {
        self.subscribe(&Self::room_name(pipeline_id))
    }

    /// Diffuse un enregistrement de sortie vers la room de son pipeline.
    /// Meilleur effort : zéro abonné n'est pas une erreur. Retourne le
    /// nombre d'abonnés atteints.
    pub fn publish(&self, output: &OutputRecord) -> usize {
        let room = Self::room_name(&output.pipeline_id);
        let sender = {
            let rooms = self.rooms.read().expect("verrou rooms empoisonné");
            rooms.get(&room).cloned()
        };
        let Some(sender) = sender else {
            return 0;
        };
        let message = RealtimeMessage { room, payload: event_payload(output) };
        sender.send(message).unwrap_or(0)
    }
}

/// Payload du message `event` : identité de l'enregistrement à plat,
/// puis les champs de `data`.
fn event_payload(output: &OutputRecord) -> Value {
    let mut payload = EventData::new();
    payload.insert("type".to_string(), Value::String("event".into()));
    payload.insert("id".to_string(), Value::String(output.id.clone()));
    payload.insert("signature".to_string(), Value::String(output.signature.clone()));
    payload.insert("timestamp".to_string(), Value::from(output.timestamp));
    payload.insert("program".to_string(), Value::String(output.program.as_str().to_string()));
    payload.insert("pipelineId".to_string(), Value::String(output.pipeline_id.clone()));
    for (key, value) in &output.data {
        payload.entry(key.clone()).or_insert_with(|| value.clone());
    }
    Value::Object(payload)
}

// --- TRANSPORT WEBSOCKET ---

/// Message de contrôle reçu d'un client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    Subscribe {
        #[serde(rename = "pipelineId")]
        pipeline_id: String,
    },
    Unsubscribe {
        #[serde(rename = "pipelineId")]
        pipeline_id: String,
    },
}

/// Sert le point d'accès WebSocket du bus.
pub async fn serve_realtime(bus: Arc<RealtimeBus>, port: u16) {
    let bus_filter = warp::any().map(move || bus.clone());
    let route = warp::path("ws")
        .and(warp::ws())
        .and(bus_filter)
        .map(|ws: warp::ws::Ws, bus: Arc<RealtimeBus>| {
            ws.on_upgrade(move |socket| client_session(socket, bus))
        });
    info!("[Realtime] Serveur WebSocket exposé sur ws://0.0.0.0:{}/ws", port);
    warp::serve(route).run(SocketAddr::from(([0, 0, 0, 0], port))).await;
}

async fn client_session(socket: WebSocket, bus: Arc<RealtimeBus>) {
    REALTIME_SUBSCRIBERS.inc();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Un seul écrivain vers la socket, alimenté par les tâches de forward.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_tx.send(Message::text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut forwards: HashMap<String, tokio::task::JoinHandle<()>> = HashMap::new();

    while let Some(incoming) = ws_rx.next().await {
        let Ok(message) = incoming else { break };
        let Ok(text) = message.to_str() else { continue };
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Subscribe { pipeline_id }) => {
                if forwards.contains_key(&pipeline_id) {
                    continue;
                }
                let mut receiver = bus.subscribe_pipeline(&pipeline_id);
                let out = out_tx.clone();
                let handle = tokio::spawn(async move {
                    loop {
                        match receiver.recv().await {
                            Ok(message) => {
                                if let Ok(text) = serde_json::to_string(&message.payload) {
                                    if out.send(text).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            // Abonné en retard : on saute les messages perdus.
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                debug!("[Realtime] Abonné en retard, {} messages sautés", skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                });
                forwards.insert(pipeline_id, handle);
            }
            Ok(ClientMessage::Unsubscribe { pipeline_id }) => {
                if let Some(handle) = forwards.remove(&pipeline_id) {
                    handle.abort();
                }
            }
            Err(e) => warn!("[Realtime] Message client illisible : {}", e),
        }
    }

    for handle in forwards.values() {
        handle.abort();
    }
    writer.abort();
    REALTIME_SUBSCRIBERS.dec();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::ProgramId;

    fn output(pipeline_id: &str) -> OutputRecord {
        let mut data = EventData::new();
        data.insert("solAmount".to_string(), Value::from(20.0));
        OutputRecord {
            id: "sig:prog:0".to_string(),
            pipeline_id: pipeline_id.to_string(),
            program: ProgramId::PumpFun,
            signature: "sig".to_string(),
            timestamp: 1_700_000_000_000,
            data,
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_room_subscriber_once() {
        let bus = RealtimeBus::new(16);
        let mut first = bus.subscribe_pipeline("P");
        let mut second = bus.subscribe_pipeline("P");
        let mut outside = bus.subscribe_pipeline("Q");

        let reached = bus.publish(&output("P"));
        assert_eq!(reached, 2);

        for receiver in [&mut first, &mut second] {
            let message = receiver.try_recv().unwrap();
            assert_eq!(message.room, "pipeline:P");
            assert_eq!(message.payload["pipelineId"], Value::String("P".into()));
            assert_eq!(message.payload["type"], Value::String("event".into()));
            assert_eq!(message.payload["solAmount"], Value::from(20.0));
            // Exactement un message.
            assert!(receiver.try_recv().is_err());
        }
        assert!(outside.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_best_effort() {
        let bus = RealtimeBus::new(16);
        assert_eq!(bus.publish(&output("P")), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_oldest() {
        let bus = RealtimeBus::new(2);
        let mut receiver = bus.subscribe_pipeline("P");
        for _ in 0..5 {
            bus.publish(&output("P"));
        }
        // Les messages les plus anciens sont perdus, pas l'émetteur bloqué.
        assert!(matches!(
            receiver.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
    }
}
