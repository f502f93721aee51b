use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::post,
    Router,
};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

use sprint_planner::room;
use sprint_planner::{AppState, Broadcaster, InMemoryRoomStore};

use super::mocks::RecordingBroadcaster;

/// A router over a fresh store plus handles to the injected halves.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryRoomStore>,
    pub broadcaster: Arc<RecordingBroadcaster>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryRoomStore::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        Self {
            router: build_router(AppState::new(store.clone(), broadcaster.clone())),
            store,
            broadcaster,
        }
    }

    /// Router wired to a real broadcaster instead of the recording mock.
    /// The `broadcaster` field of the returned app records nothing.
    pub fn with_broadcaster(broadcaster: Arc<dyn Broadcaster>) -> Self {
        let store = Arc::new(InMemoryRoomStore::new());
        Self {
            router: build_router(AppState::new(store.clone(), broadcaster)),
            store,
            broadcaster: Arc::new(RecordingBroadcaster::new()),
        }
    }

    /// POSTs a JSON body, asserting a 200 response, and decodes the body.
    pub async fn post_ok(&self, path: &str, body: String) -> serde_json::Value {
        let (status, value) = self.post(path, body).await;
        assert_eq!(status, StatusCode::OK, "unexpected status for {path}");
        value
    }

    pub async fn post(&self, path: &str, body: String) -> (StatusCode, serde_json::Value) {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or(serde_json::Value::String(
                String::from_utf8_lossy(&bytes).to_string(),
            ));
        (status, value)
    }

    pub async fn create_room(&self, host_id: &str, host_name: &str) -> String {
        let body = self
            .post_ok(
                "/room-create",
                format!(r#"{{"hostId": "{host_id}", "hostName": "{host_name}"}}"#),
            )
            .await;
        body["roomId"].as_str().unwrap().to_string()
    }

    pub async fn join(&self, room_id: &str, voter_id: &str, name: &str) -> serde_json::Value {
        self.post_ok(
            "/room-join",
            format!(r#"{{"id": "{voter_id}", "roomId": "{room_id}", "name": "{name}"}}"#),
        )
        .await
    }

    pub async fn vote(&self, room_id: &str, voter_id: &str, value: f64) {
        self.post_ok(
            "/update-vote",
            format!(r#"{{"voterId": "{voter_id}", "roomId": "{room_id}", "value": {value}}}"#),
        )
        .await;
    }

    pub async fn get_room(&self, room_id: &str) -> serde_json::Value {
        self.post_ok("/room-get", format!(r#"{{"roomId": "{room_id}"}}"#))
            .await
    }

    pub async fn reveal(&self, room_id: &str) {
        self.post_ok("/reveal-votes", format!(r#"{{"roomId": "{room_id}"}}"#))
            .await;
    }

    pub async fn reset(&self, room_id: &str) {
        self.post_ok("/reset-votes", format!(r#"{{"roomId": "{room_id}"}}"#))
            .await;
    }

    pub async fn leave(&self, room_id: &str, voter_id: &str) {
        self.post_ok(
            "/room-leave",
            format!(r#"{{"roomId": "{room_id}", "voterId": "{voter_id}"}}"#),
        )
        .await;
    }

    pub async fn close(&self, room_id: &str) {
        self.post_ok("/room-close", format!(r#"{{"roomId": "{room_id}"}}"#))
            .await;
    }

    pub async fn start_timer(&self, room_id: &str, seconds: i64) {
        self.post_ok(
            "/room-timer",
            format!(r#"{{"roomId": "{room_id}", "timer": {{"time": {seconds}}}}}"#),
        )
        .await;
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/room-create", post(room::create_room))
        .route("/room-join", post(room::join_room))
        .route("/room-get", post(room::get_room))
        .route("/room-leave", post(room::leave_room))
        .route("/room-close", post(room::close_room))
        .route("/room-timer", post(room::start_timer))
        .route("/update-vote", post(room::update_vote))
        .route("/reveal-votes", post(room::reveal_votes))
        .route("/reset-votes", post(room::reset_votes))
        .with_state(state)
}
