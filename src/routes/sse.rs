use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/public",
    tag = "sse",
    responses((status = 200, description = "Presentation SSE stream carrying board diffs and room listings", content_type = "text/event-stream", body = String))
)]
/// Stream board diffs and room listings to presentation clients.
pub async fn public_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let (greeting, receiver) = sse_service::subscribe_public(&state);
    info!(
        subscribers = state.presentation().subscriber_count(),
        "new presentation SSE connection"
    );
    sse_service::to_sse_stream(greeting, receiver)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/public", get(public_stream))
}
