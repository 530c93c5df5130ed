use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Columns Back.
/// OpenAPI description of the HTTP API.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::active_rooms,
        crate::routes::rooms::waiting_rooms,
        crate::routes::rooms::room_details,
        crate::routes::rooms::room_stats,
        crate::routes::rooms::replay_list,
        crate::routes::rooms::replay_details,
        crate::routes::sse::public_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::RoomInfo,
            crate::dto::room::RoomStats,
            crate::dto::replay::ReplaySummary,
            crate::dto::replay::ReplayMove,
            crate::dto::replay::Replay,
            crate::dto::room::GameFinished,
            crate::dto::game::SessionState,
            crate::dto::game::BoardDiff,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Read-only room directory"),
        (name = "replays", description = "Recorded match history"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "players", description = "WebSocket protocol for players and spectators"),
    )
)]
pub struct ApiDoc;
