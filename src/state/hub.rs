use std::collections::HashSet;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dto::ws::ServerMessage;

use super::room::{ConnectionId, RoomId};

/// Outbound half of a WebSocket connection.
pub type Outbound = mpsc::UnboundedSender<Message>;

/// Live socket writers and the per-room broadcast groups they belong to.
///
/// A room group reaches both its players and its spectators.
#[derive(Default)]
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, Outbound>,
    groups: DashMap<RoomId, HashSet<ConnectionId>>,
}

impl ConnectionHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track the writer of a freshly accepted connection.
    pub fn register(&self, connection_id: ConnectionId, outbound: Outbound) {
        self.connections.insert(connection_id, outbound);
    }

    /// Forget a connection and remove it from every group.
    pub fn unregister(&self, connection_id: &ConnectionId) {
        self.connections.remove(connection_id);
        self.groups.retain(|_, members| {
            members.remove(connection_id);
            !members.is_empty()
        });
    }

    /// Add a connection to a room's broadcast group.
    pub fn join_group(&self, room_id: &str, connection_id: ConnectionId) {
        self.groups
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id);
    }

    /// Remove a connection from a room's broadcast group.
    pub fn leave_group(&self, room_id: &str, connection_id: &ConnectionId) {
        self.groups
            .remove_if_mut(room_id, |_, members| {
                members.remove(connection_id);
                members.is_empty()
            });
    }

    /// Drop the whole group of a closed room.
    pub fn drop_group(&self, room_id: &str) {
        self.groups.remove(room_id);
    }

    /// Connections currently in a room's group.
    pub fn group_members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.groups
            .get(room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Send a message to one connection. Returns `false` when it is gone.
    pub fn send_to(&self, connection_id: &ConnectionId, message: &ServerMessage) -> bool {
        let Some(frame) = encode(message) else {
            return true;
        };
        self.deliver(connection_id, frame)
    }

    /// Send a message to every member of a room group.
    pub fn broadcast_room(&self, room_id: &str, message: &ServerMessage) {
        let Some(frame) = encode(message) else {
            return;
        };
        for connection_id in self.group_members(room_id) {
            self.deliver(&connection_id, frame.clone());
        }
    }

    /// Send a message to every connected socket.
    pub fn broadcast_all(&self, message: &ServerMessage) {
        let Some(frame) = encode(message) else {
            return;
        };
        let targets: Vec<ConnectionId> = self.connections.iter().map(|entry| *entry.key()).collect();
        for connection_id in targets {
            self.deliver(&connection_id, frame.clone());
        }
    }

    fn deliver(&self, connection_id: &ConnectionId, frame: Message) -> bool {
        let Some(outbound) = self
            .connections
            .get(connection_id)
            .map(|entry| entry.value().clone())
        else {
            return false;
        };

        if outbound.send(frame).is_err() {
            debug!(%connection_id, "writer closed; dropping connection");
            self.connections.remove(connection_id);
            return false;
        }
        true
    }
}

/// Serialize a message into a text frame.
///
/// Serialization failures are permanent (a bug), so they are logged and skipped.
pub fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(Message::Text(payload.into())),
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{message:?}`");
            None
        }
    }
}
