mod room;
mod shared;
mod websockets;

use axum::{routing::get, routing::post, Router};
use room::cleanup_task::{run_cleanup, CleanupConfig};
use room::store::InMemoryRoomStore;
use shared::AppState;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use websockets::broadcaster::InMemoryBroadcaster;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sprint_planner=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sprint planner server");

    let room_store = Arc::new(InMemoryRoomStore::new());
    let broadcaster = Arc::new(InMemoryBroadcaster::new());
    let app_state = AppState::new(room_store.clone(), broadcaster.clone());

    tokio::spawn(run_cleanup(
        room_store,
        broadcaster,
        CleanupConfig::default(),
    ));

    let app = Router::new()
        .route("/room-create", post(room::create_room))
        .route("/room-join", post(room::join_room))
        .route("/room-get", post(room::get_room))
        .route("/room-leave", post(room::leave_room))
        .route("/room-close", post(room::close_room))
        .route("/room-timer", post(room::start_timer))
        .route("/update-vote", post(room::update_vote))
        .route("/reveal-votes", post(room::reveal_votes))
        .route("/reset-votes", post(room::reset_votes))
        .route("/ws", get(websockets::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind listener");
    info!("Server running on http://localhost:{port}");
    axum::serve(listener, app).await.expect("server error");
}
