use async_trait::async_trait;
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::room::store::RoomStore;
use crate::shared::{AppError, AppState};
use crate::websockets::broadcaster::Broadcaster;
use crate::websockets::socket::{Connection, InboundHandler};

/// Connect-time addressing: `GET /ws?room=<roomId>&id=<voterId>`.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub room: String,
    pub id: String,
}

/// Relays whatever a client sends to everyone in its room, unvalidated.
pub struct RelayHandler {
    broadcaster: Arc<dyn Broadcaster>,
}

impl RelayHandler {
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl InboundHandler for RelayHandler {
    async fn on_message(&self, room_id: &str, voter_id: &str, text: String) {
        debug!(
            room_id = %room_id,
            voter_id = %voter_id,
            "Relaying client message to room"
        );
        self.broadcaster.broadcast_to_room(room_id, &text).await;
    }
}

/// WebSocket endpoint. Rejects connections to unknown rooms before the
/// upgrade.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    info!(
        room_id = %query.room,
        voter_id = %query.id,
        "WebSocket connection requested"
    );

    state.room_store.get_room(&query.room).await?;

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, query.room, query.id, state)))
}

async fn handle_connection(
    socket: axum::extract::ws::WebSocket,
    room_id: String,
    voter_id: String,
    state: AppState,
) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
    // Weak handle identifying this registration, so teardown cannot hit
    // the entry of a later reconnect.
    let registration = outbound_tx.downgrade();
    state
        .broadcaster
        .register_connection(&room_id, &voter_id, outbound_tx)
        .await;

    let relay = Arc::new(RelayHandler::new(state.broadcaster.clone()));
    let connection = Connection::new(
        room_id.clone(),
        voter_id.clone(),
        Box::new(socket),
        outbound_rx,
        relay,
    );

    match connection.run().await {
        Ok(()) => {
            info!(room_id = %room_id, voter_id = %voter_id, "WebSocket closed cleanly");
        }
        Err(e) => {
            warn!(
                room_id = %room_id,
                voter_id = %voter_id,
                error = %e,
                "WebSocket connection error"
            );
        }
    }

    // Read side is gone; drop the registry entry unless a reconnect
    // already replaced it.
    state
        .broadcaster
        .deregister_connection(&room_id, &voter_id, &registration)
        .await;
}
