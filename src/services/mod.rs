/// OpenAPI documentation generation.
pub mod documentation;
/// Player commands and scheduler tick fan-out.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Ordered, fire-and-forget match persistence.
pub mod persistence;
/// Read access to recorded matches.
pub mod replay_service;
/// Room membership, spectating and lobby listings.
pub mod room_service;
/// Presentation stream message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Match store connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
