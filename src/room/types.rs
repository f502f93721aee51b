use serde::{Deserialize, Serialize};

use super::models::Room;

/// Request payload for creating a room. The host id is client-supplied;
/// the room id is generated server-side.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub host_id: String,
    pub host_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: String,
}

/// Request payload for joining an existing room.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub id: String,
    pub room_id: String,
    pub name: String,
}

/// Room snapshot wrapper returned by join and get.
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomResponse {
    pub room: Room,
}

/// Shared shape for operations addressing a room as a whole
/// (get, reveal, reset, close).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomIdRequest {
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVoteRequest {
    pub voter_id: String,
    pub room_id: String,
    pub value: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomRequest {
    pub room_id: String,
    pub voter_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TimerSpec {
    /// Countdown duration in whole seconds.
    pub time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTimerRequest {
    pub room_id: String,
    pub timer: TimerSpec,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
