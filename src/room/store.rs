use async_trait::async_trait;
use rand::{distr::Alphanumeric, Rng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::models::{Room, RoomTimer, Voter};
use crate::shared::AppError;

const ROOM_ID_LEN: usize = 10;

/// Outcome of a vote submission.
#[derive(Debug, Clone, PartialEq)]
pub enum VoteResult {
    /// `has_voted` flipped; carries the new flag value for the broadcast.
    Changed { has_voted: bool },
    /// Vote value recorded or re-recorded without flipping `has_voted`.
    Unchanged,
    /// Room or voter absent. Treated as a no-op by callers, never an error.
    NotFound,
}

/// Room snapshot after a reveal/reset, plus the terminal timer snapshot
/// when a countdown was force-stopped by the operation.
#[derive(Debug, Clone)]
pub struct RoundUpdate {
    pub room: Room,
    pub stopped_timer: Option<RoomTimer>,
}

/// A freshly started countdown together with its generation token.
///
/// The generation is bumped by every start and force-stop; a countdown task
/// holding a stale generation is cancelled the next time it calls [`RoomStore::tick`].
#[derive(Debug, Clone)]
pub struct StartedTimer {
    pub timer: RoomTimer,
    pub generation: u64,
}

/// Single source of truth for room, voter and timer state.
///
/// Every operation is atomic with respect to its room: no caller can
/// observe a half-applied toggle, tick or reveal.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Allocates a room with a fresh id and the host as sole voter.
    async fn create_room(&self, host_id: &str, host_name: &str) -> (String, Voter);

    /// Snapshot of a room. Returned value is a copy, never a live handle.
    async fn get_room(&self, room_id: &str) -> Result<Room, AppError>;

    /// Adds a voter with no vote cast. Returns the post-join room snapshot
    /// and the created voter.
    async fn join_room(
        &self,
        room_id: &str,
        voter_id: &str,
        name: &str,
    ) -> Result<(Room, Voter), AppError>;

    /// Toggle-submits a vote: a repeated value clears the vote back to the
    /// sentinel. Missing room or voter is a silent no-op.
    async fn set_vote(&self, room_id: &str, voter_id: &str, value: f64) -> VoteResult;

    /// Shows all votes. Force-stops a running countdown as a side effect.
    async fn reveal(&self, room_id: &str) -> Result<RoundUpdate, AppError>;

    /// Hides and clears all votes for a new round. Force-stops a running
    /// countdown as a side effect.
    async fn reset(&self, room_id: &str) -> Result<RoundUpdate, AppError>;

    /// Removes a voter. Returns whether the voter was present. An emptied
    /// room stays open until closed explicitly or evicted as idle.
    async fn leave_room(&self, room_id: &str, voter_id: &str) -> bool;

    /// Removes the room and all its voters. Returns whether it existed.
    async fn close_room(&self, room_id: &str) -> bool;

    /// Starts a countdown, silently superseding any running one.
    /// Durations below one second are clamped to one so the countdown
    /// always reaches a terminal tick.
    async fn start_timer(&self, room_id: &str, total_seconds: i64)
        -> Result<StartedTimer, AppError>;

    /// Decrements the countdown by one second, flipping `running` off when
    /// it reaches zero. Returns `None` when the room is gone or
    /// `generation` is stale, which tells the calling task to stop.
    async fn tick(&self, room_id: &str, generation: u64) -> Option<RoomTimer>;

    /// Removes rooms with no activity for `threshold`, returning their ids
    /// so the caller can notify connected participants.
    async fn evict_idle(&self, threshold: Duration) -> Vec<String>;
}

/// Per-room record: the serializable room plus store-internal bookkeeping.
struct RoomEntry {
    room: Room,
    last_activity: Instant,
    timer_generation: u64,
}

impl RoomEntry {
    fn new(room: Room) -> Self {
        Self {
            room,
            last_activity: Instant::now(),
            timer_generation: 0,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Force-stops a running countdown and invalidates its task's
    /// generation. Returns the terminal snapshot to broadcast, if any.
    fn force_stop_timer(&mut self) -> Option<RoomTimer> {
        let stopped = self.room.stop_timer();
        if stopped.is_some() {
            self.timer_generation += 1;
        }
        stopped
    }
}

/// In-memory [`RoomStore`] with one mutex per room.
///
/// The outer map is only locked to insert, remove or look up rooms; all
/// room mutations run under the room's own mutex, so operations on
/// different rooms never contend.
pub struct InMemoryRoomStore {
    rooms: RwLock<HashMap<String, Arc<Mutex<RoomEntry>>>>,
}

impl Default for InMemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    fn generate_room_id() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(ROOM_ID_LEN)
            .map(char::from)
            .collect()
    }

    /// Runs `f` under the room's mutex, or returns `None` for an unknown
    /// room. The outer map lock is released before the room lock is taken.
    fn with_room<T>(&self, room_id: &str, f: impl FnOnce(&mut RoomEntry) -> T) -> Option<T> {
        let entry = {
            let rooms = self.rooms.read().unwrap();
            rooms.get(room_id).cloned()
        }?;
        let mut entry = entry.lock().unwrap();
        Some(f(&mut entry))
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    #[instrument(skip(self))]
    async fn create_room(&self, host_id: &str, host_name: &str) -> (String, Voter) {
        let room_id = Self::generate_room_id();
        let room = Room::new(&room_id, host_id, host_name);
        let host = room.voters[host_id].clone();

        let mut rooms = self.rooms.write().unwrap();
        rooms.insert(room_id.clone(), Arc::new(Mutex::new(RoomEntry::new(room))));

        info!(room_id = %room_id, host_id = %host_id, "Room created");
        (room_id, host)
    }

    async fn get_room(&self, room_id: &str) -> Result<Room, AppError> {
        self.with_room(room_id, |entry| entry.room.clone())
            .ok_or(AppError::RoomNotFound)
    }

    #[instrument(skip(self))]
    async fn join_room(
        &self,
        room_id: &str,
        voter_id: &str,
        name: &str,
    ) -> Result<(Room, Voter), AppError> {
        self.with_room(room_id, |entry| {
            let voter = Voter::new(voter_id, name);
            entry
                .room
                .voters
                .insert(voter_id.to_string(), voter.clone());
            entry.touch();

            info!(
                room_id = %room_id,
                voter_id = %voter_id,
                voter_count = entry.room.voters.len(),
                "Voter joined room"
            );
            (entry.room.clone(), voter)
        })
        .ok_or(AppError::RoomNotFound)
    }

    #[instrument(skip(self))]
    async fn set_vote(&self, room_id: &str, voter_id: &str, value: f64) -> VoteResult {
        let result = self.with_room(room_id, |entry| {
            let Some(voter) = entry.room.voters.get_mut(voter_id) else {
                return VoteResult::NotFound;
            };
            let flipped = voter.toggle_vote(value);
            let has_voted = voter.has_voted;
            entry.touch();

            debug!(
                room_id = %room_id,
                voter_id = %voter_id,
                has_voted = has_voted,
                flipped = flipped,
                "Vote updated"
            );
            if flipped {
                VoteResult::Changed { has_voted }
            } else {
                VoteResult::Unchanged
            }
        });

        match result {
            Some(outcome) => outcome,
            None => {
                // Documented sharp edge: a vote for an unknown room or
                // voter is dropped without an error.
                debug!(room_id = %room_id, voter_id = %voter_id, "Vote for unknown room dropped");
                VoteResult::NotFound
            }
        }
    }

    #[instrument(skip(self))]
    async fn reveal(&self, room_id: &str) -> Result<RoundUpdate, AppError> {
        self.with_room(room_id, |entry| {
            entry.room.revealed = true;
            let stopped_timer = entry.force_stop_timer();
            entry.touch();

            info!(
                room_id = %room_id,
                timer_stopped = stopped_timer.is_some(),
                "Votes revealed"
            );
            RoundUpdate {
                room: entry.room.clone(),
                stopped_timer,
            }
        })
        .ok_or(AppError::RoomNotFound)
    }

    #[instrument(skip(self))]
    async fn reset(&self, room_id: &str) -> Result<RoundUpdate, AppError> {
        self.with_room(room_id, |entry| {
            entry.room.revealed = false;
            let stopped_timer = entry.force_stop_timer();
            entry.room.clear_votes();
            entry.touch();

            info!(
                room_id = %room_id,
                timer_stopped = stopped_timer.is_some(),
                "Votes reset"
            );
            RoundUpdate {
                room: entry.room.clone(),
                stopped_timer,
            }
        })
        .ok_or(AppError::RoomNotFound)
    }

    #[instrument(skip(self))]
    async fn leave_room(&self, room_id: &str, voter_id: &str) -> bool {
        let removed = self
            .with_room(room_id, |entry| {
                let removed = entry.room.voters.remove(voter_id).is_some();
                entry.touch();
                removed
            })
            .unwrap_or(false);

        if removed {
            info!(room_id = %room_id, voter_id = %voter_id, "Voter left room");
        } else {
            debug!(room_id = %room_id, voter_id = %voter_id, "Leave for unknown room or voter");
        }
        removed
    }

    #[instrument(skip(self))]
    async fn close_room(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.write().unwrap();
        let existed = rooms.remove(room_id).is_some();
        if existed {
            info!(room_id = %room_id, "Room closed");
        } else {
            debug!(room_id = %room_id, "Close for unknown room");
        }
        existed
    }

    #[instrument(skip(self))]
    async fn start_timer(
        &self,
        room_id: &str,
        total_seconds: i64,
    ) -> Result<StartedTimer, AppError> {
        let total_seconds = total_seconds.max(1);
        self.with_room(room_id, |entry| {
            // A restart silently supersedes the previous countdown; the
            // generation bump cancels its task.
            entry.room.timer = RoomTimer::started(total_seconds);
            entry.timer_generation += 1;
            entry.touch();

            info!(
                room_id = %room_id,
                total_seconds = total_seconds,
                generation = entry.timer_generation,
                "Timer started"
            );
            StartedTimer {
                timer: entry.room.timer.clone(),
                generation: entry.timer_generation,
            }
        })
        .ok_or(AppError::RoomNotFound)
    }

    async fn tick(&self, room_id: &str, generation: u64) -> Option<RoomTimer> {
        self.with_room(room_id, |entry| {
            if entry.timer_generation != generation {
                debug!(room_id = %room_id, generation = generation, "Stale timer tick ignored");
                return None;
            }
            entry.room.timer.current -= 1;
            if entry.room.timer.current == 0 {
                entry.room.timer.running = false;
            }
            entry.touch();
            Some(entry.room.timer.clone())
        })
        .flatten()
    }

    #[instrument(skip(self))]
    async fn evict_idle(&self, threshold: Duration) -> Vec<String> {
        let mut rooms = self.rooms.write().unwrap();
        let now = Instant::now();

        let idle: Vec<String> = rooms
            .iter()
            .filter(|(_, entry)| {
                let entry = entry.lock().unwrap();
                now.duration_since(entry.last_activity) > threshold
            })
            .map(|(id, _)| id.clone())
            .collect();

        for room_id in &idle {
            rooms.remove(room_id);
            warn!(room_id = %room_id, "Evicted idle room");
        }
        idle
    }
}
