use axum::{extract::State, Json};
use tracing::{info, instrument, warn};

use super::store::{RoomStore, VoteResult};
use super::timer::run_countdown;
use super::types::{
    CreateRoomRequest, CreateRoomResponse, JoinRoomRequest, LeaveRoomRequest, RoomIdRequest,
    RoomResponse, StartTimerRequest, SuccessResponse, UpdateVoteRequest,
};
use crate::shared::{AppError, AppState};
use crate::websockets::broadcaster::{send_event, Broadcaster};
use crate::websockets::messages::Envelope;

/// POST /room-create. Allocates a room with the caller as host.
#[instrument(name = "create_room", skip(state, request))]
pub async fn create_room(
    State(state): State<AppState>,
    Json(request): Json<CreateRoomRequest>,
) -> Json<CreateRoomResponse> {
    let (room_id, _host) = state
        .room_store
        .create_room(&request.host_id, &request.host_name)
        .await;

    Json(CreateRoomResponse { room_id })
}

/// POST /room-join. Adds a voter and announces it to the room.
#[instrument(name = "join_room", skip(state, request))]
pub async fn join_room(
    State(state): State<AppState>,
    Json(request): Json<JoinRoomRequest>,
) -> Result<Json<RoomResponse>, AppError> {
    let (room, voter) = state
        .room_store
        .join_room(&request.room_id, &request.id, &request.name)
        .await?;

    send_event(
        &*state.broadcaster,
        &request.room_id,
        Envelope::voter_joined(&request.room_id, voter),
    )
    .await;

    Ok(Json(RoomResponse { room }))
}

/// POST /room-get. Returns a room snapshot, or 417 for an unknown room.
#[instrument(name = "get_room", skip(state, request))]
pub async fn get_room(
    State(state): State<AppState>,
    Json(request): Json<RoomIdRequest>,
) -> Result<Json<RoomResponse>, AppError> {
    let room = state.room_store.get_room(&request.room_id).await?;
    Ok(Json(RoomResponse { room }))
}

/// POST /update-vote. Toggle-submits a vote and broadcasts only when
/// the voter's `hasVoted` flag flipped. A vote against an unknown room
/// or voter still reports success.
#[instrument(name = "update_vote", skip(state, request))]
pub async fn update_vote(
    State(state): State<AppState>,
    Json(request): Json<UpdateVoteRequest>,
) -> Json<SuccessResponse> {
    match state
        .room_store
        .set_vote(&request.room_id, &request.voter_id, request.value)
        .await
    {
        VoteResult::Changed { has_voted } => {
            send_event(
                &*state.broadcaster,
                &request.room_id,
                Envelope::voter_updated(&request.room_id, &request.voter_id, has_voted),
            )
            .await;
        }
        VoteResult::Unchanged => {}
        VoteResult::NotFound => {
            warn!(
                room_id = %request.room_id,
                voter_id = %request.voter_id,
                "Vote dropped for unknown room or voter"
            );
        }
    }

    Json(SuccessResponse::ok())
}

/// POST /reveal-votes. Exposes all votes. A stopped countdown is
/// announced before the reveal itself.
#[instrument(name = "reveal_votes", skip(state, request))]
pub async fn reveal_votes(
    State(state): State<AppState>,
    Json(request): Json<RoomIdRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let update = state.room_store.reveal(&request.room_id).await?;

    if let Some(stopped) = update.stopped_timer {
        send_event(
            &*state.broadcaster,
            &request.room_id,
            Envelope::timer_update(stopped),
        )
        .await;
    }
    send_event(
        &*state.broadcaster,
        &request.room_id,
        Envelope::votes_revealed(update.room.votes()),
    )
    .await;

    Ok(Json(SuccessResponse::ok()))
}

/// POST /reset-votes. Clears and hides all votes for a new round.
#[instrument(name = "reset_votes", skip(state, request))]
pub async fn reset_votes(
    State(state): State<AppState>,
    Json(request): Json<RoomIdRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let update = state.room_store.reset(&request.room_id).await?;

    if let Some(stopped) = update.stopped_timer {
        send_event(
            &*state.broadcaster,
            &request.room_id,
            Envelope::timer_update(stopped),
        )
        .await;
    }
    send_event(
        &*state.broadcaster,
        &request.room_id,
        Envelope::votes_reset(),
    )
    .await;

    Ok(Json(SuccessResponse::ok()))
}

/// POST /room-leave. Removes the voter and its live connection, then
/// announces the departure to whoever is left.
#[instrument(name = "leave_room", skip(state, request))]
pub async fn leave_room(
    State(state): State<AppState>,
    Json(request): Json<LeaveRoomRequest>,
) -> Json<SuccessResponse> {
    state
        .room_store
        .leave_room(&request.room_id, &request.voter_id)
        .await;
    state
        .broadcaster
        .remove_connection(&request.room_id, &request.voter_id)
        .await;

    send_event(
        &*state.broadcaster,
        &request.room_id,
        Envelope::voter_leave(&request.voter_id),
    )
    .await;

    Json(SuccessResponse::ok())
}

/// POST /room-close. Removes the room, notifies participants, and
/// drops their registry entries.
#[instrument(name = "close_room", skip(state, request))]
pub async fn close_room(
    State(state): State<AppState>,
    Json(request): Json<RoomIdRequest>,
) -> Json<SuccessResponse> {
    state.room_store.close_room(&request.room_id).await;

    send_event(
        &*state.broadcaster,
        &request.room_id,
        Envelope::room_closed(),
    )
    .await;
    state.broadcaster.remove_room(&request.room_id).await;

    Json(SuccessResponse::ok())
}

/// POST /room-timer. Starts a countdown and holds the response until
/// it finishes or is superseded. Each tick is broadcast by the
/// countdown task.
#[instrument(name = "start_timer", skip(state, request))]
pub async fn start_timer(
    State(state): State<AppState>,
    Json(request): Json<StartTimerRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let started = state
        .room_store
        .start_timer(&request.room_id, request.timer.time)
        .await?;

    info!(
        room_id = %request.room_id,
        total_seconds = request.timer.time,
        "Countdown task starting"
    );

    let task = tokio::spawn(run_countdown(
        state.room_store.clone(),
        state.broadcaster.clone(),
        request.room_id.clone(),
        started.generation,
        started.timer.time,
    ));
    if let Err(e) = task.await {
        warn!(room_id = %request.room_id, error = %e, "Countdown task aborted");
    }

    Ok(Json(SuccessResponse::ok()))
}
