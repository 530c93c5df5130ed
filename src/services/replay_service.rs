use std::cmp::Reverse;

use tracing::debug;
use uuid::Uuid;

use crate::{
    dto::replay::{Replay, ReplayMove, ReplaySummary},
    error::ServiceError,
    state::SharedState,
};

/// Finished matches, most recently finished first.
pub async fn list_replays(state: &SharedState) -> Result<Vec<ReplaySummary>, ServiceError> {
    let store = state.require_match_store().await?;
    let mut matches = store.list_finished_matches().await?;
    matches.sort_by_key(|record| Reverse(record.finished_at));
    debug!(count = matches.len(), "listed finished matches");
    Ok(matches.into_iter().map(ReplaySummary::from).collect())
}

/// Summary and move history of one finished match.
pub async fn replay(state: &SharedState, match_id: Uuid) -> Result<Replay, ServiceError> {
    let store = state.require_match_store().await?;
    let record = store
        .find_match(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("match `{match_id}` not found")))?;

    let mut moves = store.match_moves(match_id).await?;
    moves.sort_by(|a, b| {
        a.recorded_at
            .cmp(&b.recorded_at)
            .then_with(|| a.player_id.cmp(&b.player_id))
            .then_with(|| a.move_number.cmp(&b.move_number))
    });

    Ok(Replay {
        summary: record.into(),
        moves: moves.into_iter().map(ReplayMove::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::{Duration, SystemTime},
    };

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            match_store::{MatchStore, memory::MemoryMatchStore},
            models::{MatchEntity, MatchPlayerEntity, MatchStatus, MatchUpdateEntity, MoveEntity},
        },
        state::AppState,
    };

    fn record(room_id: &str, started_at: SystemTime) -> MatchEntity {
        MatchEntity {
            id: Uuid::new_v4(),
            room_id: room_id.into(),
            players: vec![
                MatchPlayerEntity {
                    player_id: "ana".into(),
                    name: "Ana".into(),
                    score: 0,
                },
                MatchPlayerEntity {
                    player_id: "bo".into(),
                    name: "Bo".into(),
                    score: 0,
                },
            ],
            status: MatchStatus::InProgress,
            winner: None,
            finish_reason: None,
            started_at,
            finished_at: None,
        }
    }

    async fn finish(store: &MemoryMatchStore, id: Uuid, finished_at: SystemTime) {
        store
            .update_match(MatchUpdateEntity {
                id,
                status: MatchStatus::Finished,
                winner: Some("bo".into()),
                finish_reason: Some("game_over".into()),
                scores: Vec::new(),
                finished_at,
            })
            .await
            .unwrap();
    }

    fn recorded_move(match_id: Uuid, player_id: &str, move_number: u64, at: SystemTime) -> MoveEntity {
        MoveEntity {
            match_id,
            player_id: player_id.into(),
            move_number,
            command: "move_left".into(),
            grid: Vec::new(),
            score: 0,
            recorded_at: at,
        }
    }

    #[tokio::test]
    async fn degraded_mode_refuses_replay_reads() {
        let state = AppState::new(AppConfig::default());
        assert!(matches!(
            list_replays(&state).await.unwrap_err(),
            ServiceError::Degraded
        ));
        assert!(matches!(
            replay(&state, Uuid::new_v4()).await.unwrap_err(),
            ServiceError::Degraded
        ));
    }

    #[tokio::test]
    async fn only_finished_matches_are_listed_newest_first() {
        let state = AppState::new(AppConfig::default());
        let store = MemoryMatchStore::default();
        state.set_match_store(Arc::new(store.clone())).await;

        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let (older, newer, live) = (record("room_1", t0), record("room_2", t0), record("room_3", t0));
        for entity in [&older, &newer, &live] {
            store.create_match(entity.clone()).await.unwrap();
        }
        finish(&store, older.id, t0 + Duration::from_secs(60)).await;
        finish(&store, newer.id, t0 + Duration::from_secs(120)).await;

        let listed = list_replays(&state).await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|summary| summary.match_id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
        assert_eq!(listed[0].winner.as_deref(), Some("bo"));
        assert!(listed[0].finished_at.is_some());
    }

    #[tokio::test]
    async fn replay_orders_moves_by_time_and_404s_unknown_matches() {
        let state = AppState::new(AppConfig::default());
        let store = MemoryMatchStore::default();
        state.set_match_store(Arc::new(store.clone())).await;

        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let entity = record("room_1", t0);
        store.create_match(entity.clone()).await.unwrap();
        let later = t0 + Duration::from_secs(2);
        store
            .append_move(recorded_move(entity.id, "bo", 1, later))
            .await
            .unwrap();
        store
            .append_move(recorded_move(entity.id, "ana", 1, t0))
            .await
            .unwrap();
        store
            .append_move(recorded_move(Uuid::new_v4(), "ana", 1, t0))
            .await
            .unwrap();

        let replay_of = replay(&state, entity.id).await.unwrap();
        assert_eq!(replay_of.summary.room_id, "room_1");
        let order: Vec<&str> = replay_of
            .moves
            .iter()
            .map(|played| played.player_id.as_str())
            .collect();
        assert_eq!(order, ["ana", "bo"]);

        assert!(matches!(
            replay(&state, Uuid::new_v4()).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }
}
