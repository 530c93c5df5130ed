use tracing::{debug, info};

use crate::{
    dto::{
        game::session_states,
        room::{GameFinished, RoomInfo, RoomStats},
        ws::{
            CreateRoomRequest, JoinRoomRequest, LeaveRoomRequest, PlayerJoined, PlayerLeft,
            RoomCreated, RoomLeft, RoomList, RoomSessions, RoomSnapshot, ServerMessage,
            SpectateRequest,
        },
    },
    error::ServiceError,
    services::{persistence::PersistJob, sse_events},
    state::{
        SharedState,
        registry::{LeftRoom, RoomFilter, Unwatched},
        room::{ConnectionId, Player},
    },
};

/// Open a room for the caller and seat them in it.
pub async fn create_room(
    state: &SharedState,
    connection_id: ConnectionId,
    request: CreateRoomRequest,
) -> Result<(), ServiceError> {
    let name = checked_name(state, &request.name)?;
    let created = state
        .registry()
        .create(Player {
            id: request.player_id,
            name,
            connection_id,
        })
        .await?;

    state.hub().join_group(&created.room_id, connection_id);
    state.hub().send_to(
        &connection_id,
        &ServerMessage::RoomCreated(RoomCreated {
            room_id: created.room_id,
            room_info: created.info,
        }),
    );

    broadcast_room_list(state).await;
    Ok(())
}

/// Seat the caller in an existing room, starting the match on the second seat.
pub async fn join_room(
    state: &SharedState,
    connection_id: ConnectionId,
    request: JoinRoomRequest,
) -> Result<(), ServiceError> {
    let name = checked_name(state, &request.name)?;
    let joined = state
        .registry()
        .join(
            &request.room_id,
            Player {
                id: request.player_id,
                name,
                connection_id,
            },
        )
        .await?;
    let room_id = joined.room_id;

    state.hub().join_group(&room_id, connection_id);
    state.hub().send_to(
        &connection_id,
        &ServerMessage::RoomJoined(RoomSnapshot {
            room_info: joined.info.clone(),
        }),
    );
    state.hub().broadcast_room(
        &room_id,
        &ServerMessage::PlayerJoined(PlayerJoined {
            player: joined.player,
            room_info: joined.info.clone(),
        }),
    );

    if let Some(started) = joined.started {
        state.persist(PersistJob::create_match(&room_id, &started));
        state.hub().broadcast_room(
            &room_id,
            &ServerMessage::GameStarted(RoomSessions {
                room_info: joined.info,
                session_states: session_states(started.sessions),
            }),
        );
        if started.paused {
            state
                .hub()
                .broadcast_room(&room_id, &ServerMessage::paused_without_spectators());
        }
    }

    broadcast_room_list(state).await;
    Ok(())
}

/// Release the caller's seat. Leaving a running match forfeits it.
pub async fn leave_room(
    state: &SharedState,
    connection_id: ConnectionId,
    request: LeaveRoomRequest,
) -> Result<(), ServiceError> {
    ensure_seat_owner(state, connection_id, &request.player_id)?;
    let left = state.registry().leave(&request.player_id).await?;

    state.hub().leave_group(&left.room_id, &connection_id);
    state.hub().send_to(
        &connection_id,
        &ServerMessage::RoomLeft(RoomLeft {
            room_id: left.room_id.clone(),
        }),
    );
    announce_departure(state, &left, ServerMessage::PlayerLeft);

    broadcast_room_list(state).await;
    Ok(())
}

/// Rooms that are waiting or in progress, in creation order.
pub async fn list_rooms(state: &SharedState, filter: RoomFilter) -> Vec<RoomInfo> {
    state.registry().list(filter).await
}

/// Reply to `list_rooms`.
pub async fn send_room_list(state: &SharedState, connection_id: ConnectionId) {
    let rooms = list_rooms(state, RoomFilter::Active).await;
    state
        .hub()
        .send_to(&connection_id, &ServerMessage::RoomList(RoomList { rooms }));
}

/// Aggregate counters over every open room.
pub async fn stats(state: &SharedState) -> RoomStats {
    state.registry().stats().await
}

/// Reply to `get_stats`.
pub async fn send_stats(state: &SharedState, connection_id: ConnectionId) {
    let stats = stats(state).await;
    state
        .hub()
        .send_to(&connection_id, &ServerMessage::Stats(stats));
}

/// Summary of one room.
pub async fn room_info(state: &SharedState, room_id: &str) -> Result<RoomInfo, ServiceError> {
    state
        .registry()
        .room_info(room_id)
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("room `{room_id}` not found")))
}

/// Start watching a room; the first spectator resumes a paused match.
pub async fn spectate_room(
    state: &SharedState,
    connection_id: ConnectionId,
    request: SpectateRequest,
) -> Result<(), ServiceError> {
    let spectating = state
        .registry()
        .add_spectator(&request.room_id, connection_id)
        .await?;

    state.hub().join_group(&request.room_id, connection_id);
    state.hub().send_to(
        &connection_id,
        &ServerMessage::SpectateStarted(RoomSessions {
            room_info: spectating.info,
            session_states: session_states(spectating.sessions),
        }),
    );
    if spectating.resumed {
        state
            .hub()
            .broadcast_room(&request.room_id, &ServerMessage::GameResumed);
    }

    broadcast_room_list(state).await;
    Ok(())
}

/// Stop watching a room; the last spectator pauses a running match.
pub async fn stop_spectating(
    state: &SharedState,
    connection_id: ConnectionId,
    request: SpectateRequest,
) -> Result<(), ServiceError> {
    let unwatched = state
        .registry()
        .remove_spectator(&request.room_id, connection_id)
        .await?;

    state.hub().leave_group(&request.room_id, &connection_id);
    announce_unwatched(state, &unwatched);

    broadcast_room_list(state).await;
    Ok(())
}

/// Treat a dropped connection as `leave_room` plus `stop_spectating` everywhere.
pub async fn disconnect(state: &SharedState, connection_id: ConnectionId) {
    state.hub().unregister(&connection_id);
    let outcome = state.registry().disconnect(connection_id).await;

    let changed = outcome.left.is_some() || !outcome.unwatched.is_empty();
    if let Some(left) = &outcome.left {
        info!(%connection_id, room_id = %left.room_id, player_id = %left.player_id, "player disconnected");
        announce_departure(state, left, ServerMessage::PlayerDisconnected);
    }
    for unwatched in &outcome.unwatched {
        announce_unwatched(state, unwatched);
    }

    if changed {
        broadcast_room_list(state).await;
    } else {
        debug!(%connection_id, "connection closed without room membership");
    }
}

/// Push the active room listing to every socket and the presentation stream.
pub async fn broadcast_room_list(state: &SharedState) {
    let rooms = list_rooms(state, RoomFilter::Active).await;
    state
        .hub()
        .broadcast_all(&ServerMessage::RoomListUpdated(RoomList {
            rooms: rooms.clone(),
        }));
    sse_events::broadcast_room_list(state, rooms);
}

fn announce_departure(
    state: &SharedState,
    left: &LeftRoom,
    event: fn(PlayerLeft) -> ServerMessage,
) {
    state.hub().broadcast_room(
        &left.room_id,
        &event(PlayerLeft {
            player_id: left.player_id.clone(),
            room_info: left.info.clone(),
        }),
    );

    if let Some(result) = &left.forfeit {
        state.hub().broadcast_room(
            &left.room_id,
            &ServerMessage::GameFinished(GameFinished::new(&left.room_id, result)),
        );
        if let Some(match_id) = left.match_id {
            state.persist(PersistJob::update_match(match_id, result));
        }
    }

    if left.closed {
        state.hub().drop_group(&left.room_id);
    }
}

fn announce_unwatched(state: &SharedState, unwatched: &Unwatched) {
    if unwatched.paused {
        state
            .hub()
            .broadcast_room(&unwatched.room_id, &ServerMessage::paused_without_spectators());
    }
    if unwatched.closed {
        // Seats of a finished room are released with it.
        state.hub().broadcast_room(
            &unwatched.room_id,
            &ServerMessage::RoomLeft(RoomLeft {
                room_id: unwatched.room_id.clone(),
            }),
        );
        state.hub().drop_group(&unwatched.room_id);
    }
}

/// Reject commands naming a player seated from another connection.
pub(crate) fn ensure_seat_owner(
    state: &SharedState,
    connection_id: ConnectionId,
    player_id: &str,
) -> Result<(), ServiceError> {
    match state.registry().player_for_connection(&connection_id) {
        Some(seated) if seated == player_id => Ok(()),
        _ if state.registry().room_of(player_id).is_none() => Err(ServiceError::NotFound(
            format!("player `{player_id}` is not in a room"),
        )),
        _ => Err(ServiceError::InvalidState(format!(
            "player `{player_id}` is not seated from this connection"
        ))),
    }
}

fn checked_name(state: &SharedState, name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    let max = state.config().max_name_length();
    if name.chars().count() > max {
        return Err(ServiceError::InvalidInput(format!(
            "name must be at most {max} characters"
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{config::AppConfig, state::AppState};

    fn connect(state: &SharedState) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        state.hub().register(id, tx);
        (id, rx)
    }

    fn events(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
        let mut events = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            events.push(serde_json::from_str(text.as_str()).unwrap());
        }
        events
    }

    fn names(events: &[serde_json::Value]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|event| event["event"].as_str())
            .collect()
    }

    fn create(player_id: &str) -> CreateRoomRequest {
        CreateRoomRequest {
            player_id: player_id.into(),
            name: player_id.to_uppercase(),
        }
    }

    #[tokio::test]
    async fn create_replies_and_updates_every_lobby() {
        let state = AppState::new(AppConfig::default());
        let (ana, mut ana_rx) = connect(&state);
        let (_idle, mut idle_rx) = connect(&state);

        create_room(&state, ana, create("ana")).await.unwrap();

        let received = events(&mut ana_rx);
        assert_eq!(names(&received), ["room_created", "room_list_updated"]);
        assert_eq!(received[0]["data"]["roomId"], "room_1");
        assert_eq!(names(&events(&mut idle_rx)), ["room_list_updated"]);
    }

    #[tokio::test]
    async fn second_player_starts_a_paused_match() {
        let state = AppState::new(AppConfig::default());
        let (ana, mut ana_rx) = connect(&state);
        let (bo, mut bo_rx) = connect(&state);

        create_room(&state, ana, create("ana")).await.unwrap();
        events(&mut ana_rx);
        events(&mut bo_rx);

        join_room(
            &state,
            bo,
            JoinRoomRequest {
                room_id: "room_1".into(),
                player_id: "bo".into(),
                name: "Bo".into(),
            },
        )
        .await
        .unwrap();

        assert_eq!(
            names(&events(&mut ana_rx)),
            ["player_joined", "game_started", "game_paused", "room_list_updated"]
        );
        let received = events(&mut bo_rx);
        assert_eq!(received[0]["event"], "room_joined");
        let started = &received[2]["data"];
        assert_eq!(started["roomInfo"]["status"], "in_progress");
        assert_eq!(started["roomInfo"]["isPaused"], true);
        assert!(started["sessionStates"]["ana"].is_object());
        assert!(started["sessionStates"]["bo"].is_object());
    }

    #[tokio::test]
    async fn long_names_are_rejected() {
        let state = AppState::new(AppConfig::default());
        let (ana, _rx) = connect(&state);
        let err = create_room(
            &state,
            ana,
            CreateRoomRequest {
                player_id: "ana".into(),
                name: "x".repeat(33),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(state.registry().room_count(), 0);
    }

    #[tokio::test]
    async fn leave_requires_the_owning_connection() {
        let state = AppState::new(AppConfig::default());
        let (ana, _ana_rx) = connect(&state);
        let (intruder, _rx) = connect(&state);
        create_room(&state, ana, create("ana")).await.unwrap();

        let err = leave_room(
            &state,
            intruder,
            LeaveRoomRequest {
                player_id: "ana".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let err = leave_room(
            &state,
            intruder,
            LeaveRoomRequest {
                player_id: "ghost".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn spectating_resumes_and_leaving_pauses() {
        let state = AppState::new(AppConfig::default());
        let (ana, mut ana_rx) = connect(&state);
        let (bo, _bo_rx) = connect(&state);
        let (watcher, mut watcher_rx) = connect(&state);

        create_room(&state, ana, create("ana")).await.unwrap();
        join_room(
            &state,
            bo,
            JoinRoomRequest {
                room_id: "room_1".into(),
                player_id: "bo".into(),
                name: "Bo".into(),
            },
        )
        .await
        .unwrap();
        events(&mut ana_rx);
        events(&mut watcher_rx);

        let request = SpectateRequest {
            room_id: "room_1".into(),
        };
        spectate_room(&state, watcher, request.clone()).await.unwrap();
        assert_eq!(
            names(&events(&mut watcher_rx)),
            ["spectate_started", "game_resumed", "room_list_updated"]
        );
        assert_eq!(names(&events(&mut ana_rx)), ["game_resumed", "room_list_updated"]);

        stop_spectating(&state, watcher, request).await.unwrap();
        let received = events(&mut ana_rx);
        assert_eq!(names(&received), ["game_paused", "room_list_updated"]);
        assert_eq!(received[0]["data"]["reason"], "No spectators watching");
        assert_eq!(names(&events(&mut watcher_rx)), ["room_list_updated"]);
    }

    #[tokio::test]
    async fn disconnect_of_a_player_notifies_the_room() {
        let state = AppState::new(AppConfig::default());
        let (ana, _ana_rx) = connect(&state);
        let (bo, mut bo_rx) = connect(&state);
        let (watcher, _watcher_rx) = connect(&state);

        create_room(&state, ana, create("ana")).await.unwrap();
        join_room(
            &state,
            bo,
            JoinRoomRequest {
                room_id: "room_1".into(),
                player_id: "bo".into(),
                name: "Bo".into(),
            },
        )
        .await
        .unwrap();
        spectate_room(
            &state,
            watcher,
            SpectateRequest {
                room_id: "room_1".into(),
            },
        )
        .await
        .unwrap();
        events(&mut bo_rx);

        disconnect(&state, ana).await;

        let received = events(&mut bo_rx);
        assert_eq!(
            names(&received),
            ["player_disconnected", "game_finished", "room_list_updated"]
        );
        assert_eq!(received[1]["data"]["winner"], "bo");
        assert_eq!(received[1]["data"]["reason"], "forfeit");
        assert_eq!(state.registry().room_of("ana"), None);
    }

    #[tokio::test]
    async fn last_spectator_leaving_a_finished_room_releases_the_seats() {
        let state = AppState::new(AppConfig::default());
        let (ana, _ana_rx) = connect(&state);
        let (bo, mut bo_rx) = connect(&state);
        let (watcher, _watcher_rx) = connect(&state);

        create_room(&state, ana, create("ana")).await.unwrap();
        join_room(
            &state,
            bo,
            JoinRoomRequest {
                room_id: "room_1".into(),
                player_id: "bo".into(),
                name: "Bo".into(),
            },
        )
        .await
        .unwrap();
        let watch = SpectateRequest {
            room_id: "room_1".into(),
        };
        spectate_room(&state, watcher, watch.clone()).await.unwrap();
        leave_room(
            &state,
            ana,
            LeaveRoomRequest {
                player_id: "ana".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(state.registry().room_of("bo").as_deref(), Some("room_1"));
        events(&mut bo_rx);

        stop_spectating(&state, watcher, watch).await.unwrap();

        let received = events(&mut bo_rx);
        assert_eq!(names(&received), ["room_left", "room_list_updated"]);
        assert_eq!(received[0]["data"]["roomId"], "room_1");
        assert_eq!(state.registry().room_of("bo"), None);
        assert_eq!(state.registry().room_count(), 0);
    }
}
