//! End-to-end room flow driven through the socket dispatcher with in-memory writers.

use std::time::Duration;

use axum::extract::ws::Message;
use columns_back::{
    config::AppConfig,
    dto::ws::ClientMessage,
    error::ServiceError,
    services::{room_service, websocket_service},
    state::{AppState, SharedState},
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use uuid::Uuid;

struct Client {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Client {
    fn connect(state: &SharedState) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        state.hub().register(id, tx);
        Self { id, rx }
    }

    async fn send(&self, state: &SharedState, frame: Value) -> Result<(), ServiceError> {
        let message = ClientMessage::from_json_str(&frame.to_string()).expect("valid frame");
        websocket_service::dispatch(state, self.id, message).await
    }

    fn drain(&mut self) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            if let Message::Text(text) = frame {
                events.push(serde_json::from_str(text.as_str()).expect("json frame"));
            }
        }
        events
    }

    fn last(&mut self, event: &str) -> Option<Value> {
        self.drain()
            .into_iter()
            .filter(|frame| frame["event"] == event)
            .last()
            .map(|frame| frame["data"].clone())
    }
}

fn state() -> SharedState {
    // Long timings keep the automatic drop out of the way.
    AppState::new(
        AppConfig::default().with_timings(Duration::from_secs(600), Duration::from_secs(600)),
    )
}

async fn seat_two_players(state: &SharedState) -> (Client, Client) {
    let ana = Client::connect(state);
    let bo = Client::connect(state);

    ana.send(
        state,
        json!({ "event": "create_room", "data": { "playerId": "ana", "name": "Ana" } }),
    )
    .await
    .unwrap();
    bo.send(
        state,
        json!({ "event": "join_room", "data": { "roomId": "room_1", "playerId": "bo", "name": "Bo" } }),
    )
    .await
    .unwrap();
    (ana, bo)
}

#[tokio::test]
async fn unwatched_match_is_paused_until_a_spectator_arrives() {
    let state = state();
    let (mut ana, _bo) = seat_two_players(&state).await;

    let started = ana.drain();
    assert!(started.iter().any(|frame| frame["event"] == "game_started"));
    assert!(started.iter().any(|frame| frame["event"] == "game_paused"));

    let err = ana
        .send(
            &state,
            json!({ "event": "game_command", "data": { "playerId": "ana", "cmd": "rotate" } }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    let mut watcher = Client::connect(&state);
    watcher
        .send(&state, json!({ "event": "spectate_room", "data": { "roomId": "room_1" } }))
        .await
        .unwrap();
    let snapshot = watcher.last("spectate_started").expect("spectate reply");
    assert_eq!(snapshot["roomInfo"]["isPaused"], false);
    assert_eq!(snapshot["roomInfo"]["spectatorCount"], 1);
    assert!(ana.last("game_resumed").is_some());
}

#[tokio::test]
async fn rejected_command_repeats_the_last_move_number() {
    let state = state();
    let (mut ana, _bo) = seat_two_players(&state).await;
    let mut watcher = Client::connect(&state);
    watcher
        .send(&state, json!({ "event": "spectate_room", "data": { "roomId": "room_1" } }))
        .await
        .unwrap();
    watcher.drain();

    let left = json!({ "event": "game_command", "data": { "playerId": "ana", "cmd": "move_left" } });
    let right = json!({ "event": "game_command", "data": { "playerId": "ana", "cmd": "move_right" } });
    for frame in [&left, &left, &left, &right, &left, &left] {
        ana.send(&state, frame.clone()).await.unwrap();
    }

    let updates: Vec<Value> = watcher
        .drain()
        .into_iter()
        .filter(|frame| frame["event"] == "game_update")
        .collect();
    // Five accepted moves, then one against the left wall.
    assert_eq!(updates.len(), 6);
    assert_eq!(updates[4]["data"]["moveNumber"], 5);
    assert_eq!(updates[5]["data"]["moveNumber"], 5);
    assert_eq!(updates[5]["data"]["sessionState"]["currentPiece"]["x"], 0);
    assert!(ana.last("game_update").is_some());
}

#[tokio::test]
async fn listing_is_stable_between_calls() {
    let state = state();
    let (mut ana, _bo) = seat_two_players(&state).await;
    ana.drain();

    ana.send(&state, json!({ "event": "list_rooms" })).await.unwrap();
    let first = ana.last("room_list").expect("room list");
    ana.send(&state, json!({ "event": "list_rooms" })).await.unwrap();
    let second = ana.last("room_list").expect("room list");
    assert_eq!(first, second);
    assert_eq!(first["rooms"][0]["roomId"], "room_1");
    assert_eq!(first["rooms"][0]["playerCount"], 2);

    ana.send(&state, json!({ "event": "get_stats" })).await.unwrap();
    let stats = ana.last("stats").expect("stats reply");
    assert_eq!(stats["inProgressRooms"], 1);
    assert_eq!(stats["totalPlayers"], 2);
}

#[tokio::test]
async fn last_player_leaving_closes_the_room() {
    let state = state();
    let mut ana = Client::connect(&state);
    ana.send(
        &state,
        json!({ "event": "create_room", "data": { "playerId": "ana", "name": "Ana" } }),
    )
    .await
    .unwrap();

    ana.send(&state, json!({ "event": "leave_room", "data": { "playerId": "ana" } }))
        .await
        .unwrap();
    let events = ana.drain();
    assert!(
        events
            .iter()
            .any(|frame| frame["event"] == "room_left" && frame["data"]["roomId"] == "room_1")
    );
    assert_eq!(state.registry().room_count(), 0);
    assert!(room_service::room_info(&state, "room_1").await.is_err());

    let err = ana
        .send(&state, json!({ "event": "spectate_room", "data": { "roomId": "room_1" } }))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn dropped_player_forfeits_to_the_opponent() {
    let state = state();
    let (ana, mut bo) = seat_two_players(&state).await;
    bo.drain();

    room_service::disconnect(&state, ana.id).await;

    let events = bo.drain();
    let names: Vec<&str> = events
        .iter()
        .filter_map(|frame| frame["event"].as_str())
        .collect();
    assert_eq!(
        names,
        ["player_disconnected", "game_finished", "room_list_updated"]
    );
    assert_eq!(events[0]["data"]["playerId"], "ana");
    assert_eq!(events[1]["data"]["winner"], "bo");
    assert_eq!(events[1]["data"]["reason"], "forfeit");
    assert_eq!(state.registry().room_of("ana"), None);
    // With nobody watching, the finished room closes immediately.
    assert_eq!(state.registry().room_count(), 0);
}
