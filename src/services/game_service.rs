use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::{
        room::GameFinished,
        ws::{GameCommandRequest, GameUpdate, ServerMessage},
    },
    error::ServiceError,
    services::{persistence::PersistJob, room_service, sse_events},
    state::{
        RoomTick, SharedState,
        room::{ConnectionId, MatchResult, SessionUpdate},
    },
};

/// Apply a player command and fan out its effects.
///
/// Every command reaching a running game is answered with a `game_update`;
/// only accepted ones advance the move counter and produce a move record.
pub async fn handle_command(
    state: &SharedState,
    connection_id: ConnectionId,
    request: GameCommandRequest,
) -> Result<(), ServiceError> {
    room_service::ensure_seat_owner(state, connection_id, &request.player_id)?;
    let applied = state
        .registry()
        .apply_command(&request.player_id, request.cmd)
        .await?;
    let room_id = applied.room_id;
    let report = applied.report;
    let accepted = report.outcome.is_accepted();

    if accepted {
        if let Some(match_id) = applied.match_id {
            state.persist(PersistJob::append_move(match_id, request.cmd, &report));
        }
    } else {
        debug!(room_id = %room_id, player_id = %report.player_id, cmd = request.cmd.as_str(), "command had no effect");
    }

    broadcast_update(state, &room_id, report.update()).await;
    if accepted {
        publish_board_changes(state, &room_id).await;
    }

    if let Some(result) = &report.finished {
        finish_match(state, &room_id, applied.match_id, result).await;
    }
    Ok(())
}

/// Consume scheduler reports until every sender is gone.
pub async fn run_tick_dispatcher(state: SharedState, mut reports: mpsc::UnboundedReceiver<RoomTick>) {
    while let Some(tick) = reports.recv().await {
        dispatch_tick(&state, tick).await;
    }
    debug!("tick dispatcher stopped");
}

async fn dispatch_tick(state: &SharedState, tick: RoomTick) {
    let RoomTick { room_id, report } = tick;

    for update in report.updates {
        broadcast_update(state, &room_id, update).await;
    }
    publish_board_changes(state, &room_id).await;

    if let Some(result) = &report.finished {
        let match_id = state.registry().match_id(&room_id).await;
        state.registry().scheduler().stop(&room_id);
        finish_match(state, &room_id, match_id, result).await;
    }
}

/// Send a session update to the room group unless a newer one already went out.
async fn broadcast_update(state: &SharedState, room_id: &str, update: SessionUpdate) {
    let message = ServerMessage::GameUpdate(GameUpdate {
        player_id: update.player_id.clone(),
        session_state: update.snapshot.clone().into(),
        move_number: update.move_number,
    });
    state
        .registry()
        .publish_update(room_id, &update, || state.hub().broadcast_room(room_id, &message))
        .await;
}

/// Announce the outcome, record it and close the room when nobody is left to watch.
async fn finish_match(
    state: &SharedState,
    room_id: &str,
    match_id: Option<Uuid>,
    result: &MatchResult,
) {
    info!(room_id, winner = ?result.winner, reason = ?result.reason, "match finished");
    state.hub().broadcast_room(
        room_id,
        &ServerMessage::GameFinished(GameFinished::new(room_id, result)),
    );
    if let Some(match_id) = match_id {
        state.persist(PersistJob::update_match(match_id, result));
    }

    if state.registry().close_if_eligible(room_id).await {
        state.hub().drop_group(room_id);
    }
    room_service::broadcast_room_list(state).await;
}

async fn publish_board_changes(state: &SharedState, room_id: &str) {
    if state.presentation().subscriber_count() == 0 {
        return;
    }
    let changes = state.registry().take_board_changes(room_id).await;
    sse_events::broadcast_board_diffs(state, room_id, changes);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::extract::ws::Message;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dto::ws::{CreateRoomRequest, JoinRoomRequest, SpectateRequest},
        game::GameCommand,
        state::AppState,
    };

    fn connect(state: &SharedState) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        state.hub().register(id, tx);
        (id, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
        let mut events = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            events.push(serde_json::from_str(text.as_str()).unwrap());
        }
        events
    }

    async fn live_match(
        state: &SharedState,
    ) -> (ConnectionId, ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let (ana, _ana_rx) = connect(state);
        let (bo, _bo_rx) = connect(state);
        let (watcher, watcher_rx) = connect(state);

        room_service::create_room(
            state,
            ana,
            CreateRoomRequest {
                player_id: "ana".into(),
                name: "Ana".into(),
            },
        )
        .await
        .unwrap();
        room_service::join_room(
            state,
            bo,
            JoinRoomRequest {
                room_id: "room_1".into(),
                player_id: "bo".into(),
                name: "Bo".into(),
            },
        )
        .await
        .unwrap();
        room_service::spectate_room(
            state,
            watcher,
            SpectateRequest {
                room_id: "room_1".into(),
            },
        )
        .await
        .unwrap();
        (ana, bo, watcher_rx)
    }

    fn command(player_id: &str, cmd: GameCommand) -> GameCommandRequest {
        GameCommandRequest {
            player_id: player_id.into(),
            cmd,
        }
    }

    #[tokio::test]
    async fn accepted_commands_broadcast_numbered_updates() {
        let state = AppState::new(AppConfig::default());
        let (ana, _bo, mut watcher_rx) = live_match(&state).await;
        drain(&mut watcher_rx);

        handle_command(&state, ana, command("ana", GameCommand::MoveLeft))
            .await
            .unwrap();

        let events = drain(&mut watcher_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event"], "game_update");
        assert_eq!(events[0]["data"]["playerId"], "ana");
        assert_eq!(events[0]["data"]["moveNumber"], 1);
    }

    #[tokio::test]
    async fn rejected_commands_echo_the_unchanged_counter() {
        let state = AppState::new(AppConfig::default());
        let mut jobs = state.take_persistence_jobs().await.unwrap();
        let (ana, _bo, mut watcher_rx) = live_match(&state).await;

        for _ in 0..3 {
            handle_command(&state, ana, command("ana", GameCommand::MoveLeft))
                .await
                .unwrap();
        }
        drain(&mut watcher_rx);

        // Piece already against the left wall.
        handle_command(&state, ana, command("ana", GameCommand::MoveLeft))
            .await
            .unwrap();
        let events = drain(&mut watcher_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event"], "game_update");
        assert_eq!(events[0]["data"]["moveNumber"], 3);
        assert_eq!(events[0]["data"]["sessionState"]["currentPiece"]["x"], 0);

        let mut recorded = Vec::new();
        while let Ok(job) = jobs.try_recv() {
            if let PersistJob::AppendMove(record) = job {
                recorded.push(record.move_number);
            }
        }
        assert_eq!(recorded, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn queued_tick_never_overwrites_a_newer_command() {
        let config = AppConfig::default().with_timings(Duration::ZERO, Duration::from_millis(10));
        let state = AppState::new(config);
        let mut reports = state.take_tick_reports().await.unwrap();
        let (ana, _bo, mut watcher_rx) = live_match(&state).await;

        let queued = tokio::time::timeout(Duration::from_secs(2), reports.recv())
            .await
            .expect("tick within deadline")
            .expect("scheduler alive");
        state.registry().scheduler().stop("room_1");
        drain(&mut watcher_rx);

        handle_command(&state, ana, command("ana", GameCommand::MoveLeft))
            .await
            .unwrap();
        let after_command = drain(&mut watcher_rx);
        assert_eq!(after_command.len(), 1);

        dispatch_tick(&state, queued).await;
        let stale: Vec<_> = drain(&mut watcher_rx)
            .into_iter()
            .filter(|frame| frame["event"] == "game_update" && frame["data"]["playerId"] == "ana")
            .collect();
        assert!(stale.is_empty(), "superseded tick state was broadcast: {stale:?}");
        assert_eq!(after_command[0]["data"]["moveNumber"], 1);
    }

    #[tokio::test]
    async fn commands_from_another_connection_are_refused() {
        let state = AppState::new(AppConfig::default());
        let (_ana, bo, _watcher_rx) = live_match(&state).await;

        let err = handle_command(&state, bo, command("ana", GameCommand::Rotate))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn dispatcher_forwards_ticks_as_updates() {
        let config = AppConfig::default().with_timings(Duration::ZERO, Duration::from_millis(10));
        let state = AppState::new(config);
        let reports = state.take_tick_reports().await.unwrap();
        tokio::spawn(run_tick_dispatcher(state.clone(), reports));

        let (_ana, _bo, mut watcher_rx) = live_match(&state).await;
        drain(&mut watcher_rx);

        let frame = tokio::time::timeout(Duration::from_secs(2), watcher_rx.recv())
            .await
            .expect("tick update within deadline")
            .expect("writer open");
        let Message::Text(text) = frame else {
            panic!("unexpected frame");
        };
        let event: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(event["event"], "game_update");
        assert_eq!(event["data"]["moveNumber"], 0);
    }
}
