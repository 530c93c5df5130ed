use tracing::debug;

use crate::{
    dto::{game::BoardDiff, room::RoomInfo, sse::SystemStatus, ws::RoomList},
    state::{SharedState, room::BoardChanges},
};

const EVENT_BOARD_DIFF: &str = "board_diff";
const EVENT_ROOM_LIST_UPDATED: &str = "room_list_updated";
const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Broadcast the cells that changed on each board of a room.
pub fn broadcast_board_diffs(state: &SharedState, room_id: &str, changes: Vec<BoardChanges>) {
    for change in changes {
        if change.cells.is_empty() {
            continue;
        }
        let payload = BoardDiff::new(room_id, change);
        state.presentation().publish(EVENT_BOARD_DIFF, &payload);
    }
}

/// Broadcast the current room listing to presentation clients.
pub fn broadcast_room_list(state: &SharedState, rooms: Vec<RoomInfo>) {
    state
        .presentation()
        .publish(EVENT_ROOM_LIST_UPDATED, &RoomList { rooms });
}

/// Broadcast a change of the degraded flag.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    state
        .presentation()
        .publish(EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

/// Relay degraded mode changes onto the presentation stream until shutdown.
pub async fn forward_system_status(state: SharedState) {
    let mut watcher = state.degraded_watcher();
    while watcher.changed().await.is_ok() {
        let degraded = *watcher.borrow_and_update();
        debug!(degraded, "system status changed");
        broadcast_system_status(&state, degraded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        game::Cell,
        state::AppState,
    };

    #[tokio::test]
    async fn empty_diffs_are_not_broadcast() {
        let state = AppState::new(AppConfig::default());
        let mut rx = state.presentation().subscribe();

        broadcast_board_diffs(
            &state,
            "room_1",
            vec![
                BoardChanges {
                    player_id: "ana".into(),
                    player_name: "Ana".into(),
                    cells: vec![],
                },
                BoardChanges {
                    player_id: "bo".into(),
                    player_name: "Bo".into(),
                    cells: vec![Cell { x: 2, y: 11, color: 4 }],
                },
            ],
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_BOARD_DIFF));
        assert!(event.data.contains(r#""playerId":"bo""#));
        assert!(event.data.contains(r#""updatedNodes":[{"x":2,"y":11,"color":4}]"#));
        assert!(rx.try_recv().is_err());
    }
}
