use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;
use validator::ValidationError;

use crate::{
    dto::{
        replay::{Replay, ReplaySummary},
        room::{RoomInfo, RoomStats},
        validation::validate_room_id,
    },
    error::AppError,
    services::{replay_service, room_service},
    state::{SharedState, registry::RoomFilter},
};

/// Read-only room directory and match replays.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/rooms/active", get(active_rooms))
        .route("/api/rooms/waiting", get(waiting_rooms))
        .route("/api/rooms/stats/summary", get(room_stats))
        .route("/api/rooms/replays/list", get(replay_list))
        .route("/api/rooms/replays/{match_id}", get(replay_details))
        .route("/api/rooms/{room_id}", get(room_details))
}

#[utoipa::path(
    get,
    path = "/api/rooms/active",
    tag = "rooms",
    responses((status = 200, description = "Rooms waiting or in progress", body = [RoomInfo]))
)]
/// Return every room that is waiting for a player or playing.
pub async fn active_rooms(State(state): State<SharedState>) -> Json<Vec<RoomInfo>> {
    Json(room_service::list_rooms(&state, RoomFilter::Active).await)
}

#[utoipa::path(
    get,
    path = "/api/rooms/waiting",
    tag = "rooms",
    responses((status = 200, description = "Rooms with a free seat", body = [RoomInfo]))
)]
/// Return rooms still waiting for their second player.
pub async fn waiting_rooms(State(state): State<SharedState>) -> Json<Vec<RoomInfo>> {
    Json(room_service::list_rooms(&state, RoomFilter::Waiting).await)
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room identifier such as `room_3`")),
    responses(
        (status = 200, description = "Room summary", body = RoomInfo),
        (status = 400, description = "Malformed room identifier"),
        (status = 404, description = "Unknown room")
    )
)]
/// Return the summary of a single room.
pub async fn room_details(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomInfo>, AppError> {
    validate_room_id(&room_id).map_err(|err: ValidationError| {
        AppError::BadRequest(format!("invalid room id `{room_id}`: {err}"))
    })?;
    let info = room_service::room_info(&state, &room_id).await?;
    Ok(Json(info))
}

#[utoipa::path(
    get,
    path = "/api/rooms/stats/summary",
    tag = "rooms",
    responses((status = 200, description = "Aggregate room counters", body = RoomStats))
)]
/// Return aggregate counters over every open room.
pub async fn room_stats(State(state): State<SharedState>) -> Json<RoomStats> {
    Json(room_service::stats(&state).await)
}

#[utoipa::path(
    get,
    path = "/api/rooms/replays/list",
    tag = "replays",
    responses(
        (status = 200, description = "Finished matches, newest first", body = [ReplaySummary]),
        (status = 503, description = "Match history unavailable (degraded mode)")
    )
)]
/// Return every finished match that can be replayed.
pub async fn replay_list(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ReplaySummary>>, AppError> {
    let replays = replay_service::list_replays(&state).await?;
    Ok(Json(replays))
}

#[utoipa::path(
    get,
    path = "/api/rooms/replays/{match_id}",
    tag = "replays",
    params(("match_id" = Uuid, Path, description = "Identifier of the recorded match")),
    responses(
        (status = 200, description = "Match summary and move history", body = Replay),
        (status = 400, description = "Malformed match identifier"),
        (status = 404, description = "Unknown match"),
        (status = 503, description = "Match history unavailable (degraded mode)")
    )
)]
/// Return the recorded moves of one match.
pub async fn replay_details(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<Replay>, AppError> {
    let replay = replay_service::replay(&state, match_id).await?;
    Ok(Json(replay))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::{config::AppConfig, dao::match_store::memory::MemoryMatchStore, state::AppState};

    #[tokio::test]
    async fn unknown_room_is_404() {
        let state = AppState::new(AppConfig::default());
        let app = router().with_state(state);

        let response = app
            .oneshot(Request::get("/api/rooms/room_9").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn replays_are_unavailable_while_degraded() {
        let state = AppState::new(AppConfig::default());
        let app = router().with_state(state);

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/rooms/replays/list")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let uri = format!("/api/rooms/replays/{}", Uuid::new_v4());
        let response = app
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn replay_list_reads_the_match_store() {
        let state = AppState::new(AppConfig::default());
        state
            .set_match_store(std::sync::Arc::new(MemoryMatchStore::default()))
            .await;
        let app = router().with_state(state);

        let response = app
            .oneshot(
                Request::get("/api/rooms/replays/list")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
