use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Reserved vote value meaning "no vote cast".
pub const NO_VOTE: f64 = -1.0;

/// Synchronized countdown state for a room.
///
/// `running == false` means no countdown task is active. A force-stopped
/// timer carries `time = -1, current = -1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTimer {
    pub running: bool,
    /// Configured total duration in whole seconds.
    pub time: i64,
    /// Seconds remaining, decremented once per tick.
    pub current: i64,
}

impl RoomTimer {
    /// A fresh countdown over `total_seconds`.
    pub fn started(total_seconds: i64) -> Self {
        Self {
            running: true,
            time: total_seconds,
            current: total_seconds,
        }
    }

    /// The terminal snapshot produced by a reveal/reset force-stop.
    pub fn stopped() -> Self {
        Self {
            running: false,
            time: -1,
            current: -1,
        }
    }
}

/// A session participant. One voter per room is the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voter {
    pub id: String,
    pub name: String,
    pub vote: f64,
    pub has_voted: bool,
    pub is_host: bool,
}

impl Voter {
    /// Creates a voter with no vote cast.
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            vote: NO_VOTE,
            has_voted: false,
            is_host: false,
        }
    }

    /// Applies the toggle semantics: submitting the current vote again
    /// clears it, any other value records it. Returns whether `has_voted`
    /// flipped, which is the broadcast trigger.
    pub fn toggle_vote(&mut self, value: f64) -> bool {
        let was_voted = self.has_voted;
        self.has_voted = self.vote != value;
        self.vote = if self.has_voted { value } else { NO_VOTE };
        was_voted != self.has_voted
    }
}

/// Canonical state of one estimation session.
///
/// Pure wire/data value: connection handles and store bookkeeping
/// (activity timestamps, timer generation) live outside this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    /// Voter id of the room creator.
    pub host: String,
    pub voters: HashMap<String, Voter>,
    pub revealed: bool,
    pub timer: RoomTimer,
}

impl Room {
    /// Creates a room containing the host as its sole voter.
    pub fn new(id: &str, host_id: &str, host_name: &str) -> Self {
        let mut host = Voter::new(host_id, host_name);
        host.is_host = true;

        let mut voters = HashMap::new();
        voters.insert(host_id.to_string(), host);

        Self {
            id: id.to_string(),
            host: host_id.to_string(),
            voters,
            revealed: false,
            timer: RoomTimer::default(),
        }
    }

    /// Map of voter id to current vote, as sent in `votesRevealed`.
    pub fn votes(&self) -> HashMap<String, f64> {
        self.voters
            .iter()
            .map(|(id, v)| (id.clone(), v.vote))
            .collect()
    }

    /// Clears every voter's vote back to the sentinel.
    pub fn clear_votes(&mut self) {
        for voter in self.voters.values_mut() {
            voter.vote = NO_VOTE;
            voter.has_voted = false;
        }
    }

    /// Force-stops a running countdown. Returns the terminal timer
    /// snapshot if one was actually running.
    pub fn stop_timer(&mut self) -> Option<RoomTimer> {
        if !self.timer.running {
            return None;
        }
        self.timer = RoomTimer::stopped();
        Some(self.timer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_room_contains_only_the_host() {
        let room = Room::new("room-1", "h1", "Alice");

        assert_eq!(room.host, "h1");
        assert_eq!(room.voters.len(), 1);
        let host = &room.voters["h1"];
        assert!(host.is_host);
        assert_eq!(host.vote, NO_VOTE);
        assert!(!host.has_voted);
        assert!(!room.revealed);
        assert!(!room.timer.running);
    }

    #[test]
    fn toggle_vote_records_then_clears() {
        let mut voter = Voter::new("v1", "Bob");

        assert!(voter.toggle_vote(5.0));
        assert_eq!(voter.vote, 5.0);
        assert!(voter.has_voted);

        // Same value again clears the vote.
        assert!(voter.toggle_vote(5.0));
        assert_eq!(voter.vote, NO_VOTE);
        assert!(!voter.has_voted);
    }

    #[test]
    fn toggle_vote_to_different_value_does_not_flip_has_voted() {
        let mut voter = Voter::new("v1", "Bob");

        assert!(voter.toggle_vote(3.0));
        assert!(!voter.toggle_vote(8.0));
        assert_eq!(voter.vote, 8.0);
        assert!(voter.has_voted);
    }

    #[test]
    fn has_voted_tracks_sentinel_after_every_toggle() {
        let mut voter = Voter::new("v1", "Bob");
        for value in [2.0, 2.0, 13.0, 1.0, 1.0] {
            voter.toggle_vote(value);
            assert_eq!(voter.has_voted, voter.vote != NO_VOTE);
        }
    }

    #[test]
    fn stop_timer_is_terminal_and_idempotent() {
        let mut room = Room::new("room-1", "h1", "Alice");
        room.timer = RoomTimer::started(30);

        let stopped = room.stop_timer().expect("timer was running");
        assert_eq!(stopped, RoomTimer::stopped());
        assert_eq!(stopped.current, -1);

        // Second stop reports nothing to broadcast.
        assert!(room.stop_timer().is_none());
    }

    #[test]
    fn voter_serializes_camel_case() {
        let voter = Voter::new("v1", "Bob");
        let json = serde_json::to_value(&voter).unwrap();
        assert_eq!(json["hasVoted"], false);
        assert_eq!(json["isHost"], false);
        assert_eq!(json["vote"], -1.0);
    }
}
