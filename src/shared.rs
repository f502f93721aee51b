use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use thiserror::Error;

use crate::room::store::RoomStore;
use crate::websockets::broadcaster::Broadcaster;

/// Shared application state: the room store and the broadcaster, injected
/// as trait objects so tests can swap either.
#[derive(Clone)]
pub struct AppState {
    pub room_store: Arc<dyn RoomStore>,
    pub broadcaster: Arc<dyn Broadcaster>,
}

impl AppState {
    pub fn new(room_store: Arc<dyn RoomStore>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            room_store,
            broadcaster,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Room (or, on join, its voter mapping) does not exist. The fixed
    /// sentinel body is part of the wire contract.
    #[error("ROOM_NOT_FOUND")]
    RoomNotFound,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            // 417 with the literal sentinel as a plain text body.
            AppError::RoomNotFound => {
                (StatusCode::EXPECTATION_FAILED, "ROOM_NOT_FOUND").into_response()
            }
        }
    }
}
