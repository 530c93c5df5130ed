use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    error::ServiceError,
    services::{game_service, room_service},
    state::{SharedState, room::ConnectionId},
};

/// Handle the full lifecycle of a player or spectator WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection_id: ConnectionId = Uuid::new_v4();
    state.hub().register(connection_id, outbound_tx.clone());
    info!(%connection_id, "client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(%connection_id, payload = %text, "received client message");
                match ClientMessage::from_json_str(&text) {
                    Ok(message) => {
                        let event = message.event_name();
                        if let Err(err) = dispatch(&state, connection_id, message).await {
                            match &err {
                                ServiceError::Internal(_) => {
                                    warn!(%connection_id, event, error = %err, "client event failed")
                                }
                                _ => debug!(%connection_id, event, error = %err, "client event rejected"),
                            }
                            reply_error(&state, connection_id, err.client_message());
                        }
                    }
                    Err(err) => {
                        warn!(%connection_id, error = %err, "failed to parse or validate client message");
                        reply_error(&state, connection_id, err.to_string());
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%connection_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {
                reply_error(&state, connection_id, "binary frames are not supported");
            }
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    room_service::disconnect(&state, connection_id).await;
    info!(%connection_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Route one decoded event to its service.
pub async fn dispatch(
    state: &SharedState,
    connection_id: ConnectionId,
    message: ClientMessage,
) -> Result<(), ServiceError> {
    match message {
        ClientMessage::CreateRoom(request) => {
            room_service::create_room(state, connection_id, request).await
        }
        ClientMessage::JoinRoom(request) => {
            room_service::join_room(state, connection_id, request).await
        }
        ClientMessage::LeaveRoom(request) => {
            room_service::leave_room(state, connection_id, request).await
        }
        ClientMessage::ListRooms => {
            room_service::send_room_list(state, connection_id).await;
            Ok(())
        }
        ClientMessage::GetStats => {
            room_service::send_stats(state, connection_id).await;
            Ok(())
        }
        ClientMessage::GameCommand(request) => {
            game_service::handle_command(state, connection_id, request).await
        }
        ClientMessage::SpectateRoom(request) => {
            room_service::spectate_room(state, connection_id, request).await
        }
        ClientMessage::StopSpectating(request) => {
            room_service::stop_spectating(state, connection_id, request).await
        }
    }
}

/// Send an `error` event to the caller only.
fn reply_error(state: &SharedState, connection_id: ConnectionId, message: impl Into<String>) {
    state
        .hub()
        .send_to(&connection_id, &ServerMessage::error(message));
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
