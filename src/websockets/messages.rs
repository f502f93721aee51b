use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::room::models::{RoomTimer, Voter};

/// Tags for server-pushed room events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    VoterJoined,
    VoterUpdated,
    VotesRevealed,
    VotesReset,
    VoterLeave,
    RoomClosed,
    TimerUpdate,
}

/// Envelope shared by every broadcast: a millisecond timestamp, a type
/// tag, an event-specific payload and optional origin fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterJoinedPayload {
    pub voter: Voter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterUpdatedPayload {
    pub voter_id: String,
    /// Name of the changed voter field, currently always `hasVoted`.
    pub property: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotesRevealedPayload {
    pub votes: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterLeavePayload {
    pub voter_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerUpdatePayload {
    pub timer: RoomTimer,
}

impl Envelope {
    fn new(event_type: EventType, message: Option<serde_json::Value>) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            event_type,
            message,
            from: None,
            room: None,
        }
    }

    /// A voter entered the room.
    pub fn voter_joined(room_id: &str, voter: Voter) -> Self {
        let from = voter.id.clone();
        let payload = VoterJoinedPayload { voter };
        Self {
            from: Some(from),
            room: Some(room_id.to_string()),
            ..Self::new(
                EventType::VoterJoined,
                Some(serde_json::to_value(payload).unwrap()),
            )
        }
    }

    /// A voter's `hasVoted` flag flipped.
    pub fn voter_updated(room_id: &str, voter_id: &str, has_voted: bool) -> Self {
        let payload = VoterUpdatedPayload {
            voter_id: voter_id.to_string(),
            property: "hasVoted".to_string(),
            value: serde_json::Value::Bool(has_voted),
        };
        Self {
            from: Some(voter_id.to_string()),
            room: Some(room_id.to_string()),
            ..Self::new(
                EventType::VoterUpdated,
                Some(serde_json::to_value(payload).unwrap()),
            )
        }
    }

    /// All collected votes, exposed simultaneously.
    pub fn votes_revealed(votes: HashMap<String, f64>) -> Self {
        let payload = VotesRevealedPayload { votes };
        Self::new(
            EventType::VotesRevealed,
            Some(serde_json::to_value(payload).unwrap()),
        )
    }

    /// Votes were cleared and hidden for a new round.
    pub fn votes_reset() -> Self {
        Self::new(EventType::VotesReset, None)
    }

    /// A voter left the room.
    pub fn voter_leave(voter_id: &str) -> Self {
        let payload = VoterLeavePayload {
            voter_id: voter_id.to_string(),
        };
        Self::new(
            EventType::VoterLeave,
            Some(serde_json::to_value(payload).unwrap()),
        )
    }

    /// The room was closed or evicted.
    pub fn room_closed() -> Self {
        Self::new(EventType::RoomClosed, None)
    }

    /// Countdown tick or terminal stop, carrying the timer snapshot.
    pub fn timer_update(timer: RoomTimer) -> Self {
        let payload = TimerUpdatePayload { timer };
        Self::new(
            EventType::TimerUpdate,
            Some(serde_json::to_value(payload).unwrap()),
        )
    }
}
