use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        game::{SessionState, SessionStates},
        room::{GameFinished, PlayerInfo, RoomInfo, RoomStats},
        validation::{validate_display_name, validate_player_id, validate_room_id},
    },
    game::GameCommand,
};

/// Reason sent with `game_paused` when the last spectator leaves.
pub const NO_SPECTATORS_REASON: &str = "No spectators watching";

/// Failure to decode an inbound frame.
#[derive(Debug, Error)]
pub enum InboundError {
    /// Not JSON, or not a known event.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Well-formed but failed validation.
    #[error("invalid payload: {0}")]
    Invalid(#[from] ValidationErrors),
}

#[derive(Debug, Deserialize, ToSchema)]
/// Messages accepted from player and spectator WebSocket clients.
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a room.
    CreateRoom(CreateRoomRequest),
    /// Take the free seat of a room.
    JoinRoom(JoinRoomRequest),
    /// Leave the current room.
    LeaveRoom(LeaveRoomRequest),
    /// List every open room.
    ListRooms,
    /// Aggregate room counters.
    GetStats,
    /// Move, rotate or drop the falling piece.
    GameCommand(GameCommandRequest),
    /// Watch a room.
    SpectateRoom(SpectateRequest),
    /// Stop watching a room.
    StopSpectating(SpectateRequest),
}

impl ClientMessage {
    /// Parse a text frame and validate its payload.
    pub fn from_json_str(text: &str) -> Result<Self, InboundError> {
        let message: Self = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }

    /// Wire name of the event, for logs.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::CreateRoom(_) => "create_room",
            Self::JoinRoom(_) => "join_room",
            Self::LeaveRoom(_) => "leave_room",
            Self::ListRooms => "list_rooms",
            Self::GetStats => "get_stats",
            Self::GameCommand(_) => "game_command",
            Self::SpectateRoom(_) => "spectate_room",
            Self::StopSpectating(_) => "stop_spectating",
        }
    }
}

impl Validate for ClientMessage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::CreateRoom(payload) => payload.validate(),
            Self::JoinRoom(payload) => payload.validate(),
            Self::LeaveRoom(payload) => payload.validate(),
            Self::GameCommand(payload) => payload.validate(),
            Self::SpectateRoom(payload) | Self::StopSpectating(payload) => payload.validate(),
            Self::ListRooms | Self::GetStats => Ok(()),
        }
    }
}

/// Open a new room and take its first seat.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Client-chosen identifier.
    #[validate(custom(function = "validate_player_id"))]
    pub player_id: String,
    /// Display name.
    #[validate(custom(function = "validate_display_name"))]
    pub name: String,
}

/// Take the second seat of an existing room.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    /// Room to join.
    #[validate(custom(function = "validate_room_id"))]
    pub room_id: String,
    /// Client-chosen identifier.
    #[validate(custom(function = "validate_player_id"))]
    pub player_id: String,
    /// Display name.
    #[validate(custom(function = "validate_display_name"))]
    pub name: String,
}

/// Give up the seat currently held by a player.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomRequest {
    /// Seated player.
    #[validate(custom(function = "validate_player_id"))]
    pub player_id: String,
}

/// Player input routed to the owning room.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GameCommandRequest {
    /// Seated player issuing the command.
    #[validate(custom(function = "validate_player_id"))]
    pub player_id: String,
    /// Requested action.
    pub cmd: GameCommand,
}

/// Start or stop watching a room.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SpectateRequest {
    /// Room to watch or stop watching.
    #[validate(custom(function = "validate_room_id"))]
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Messages pushed to WebSocket clients.
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Room opened for the caller.
    RoomCreated(RoomCreated),
    /// Caller took the second seat.
    RoomJoined(RoomSnapshot),
    /// Caller no longer holds a seat.
    RoomLeft(RoomLeft),
    /// Second seat taken.
    PlayerJoined(PlayerJoined),
    /// A player left the room.
    PlayerLeft(PlayerLeft),
    /// A player's connection dropped.
    PlayerDisconnected(PlayerLeft),
    /// Match began with fresh sessions.
    GameStarted(RoomSessions),
    /// One session changed.
    GameUpdate(GameUpdate),
    /// Automatic drops suspended.
    GamePaused(GamePaused),
    /// Automatic drops restarted.
    GameResumed,
    /// Match over.
    GameFinished(GameFinished),
    /// Caller is now watching.
    SpectateStarted(RoomSessions),
    /// Reply to `list_rooms`.
    RoomList(RoomList),
    /// Lobby-wide room listing after a change.
    RoomListUpdated(RoomList),
    /// Reply to `get_stats`.
    Stats(RoomStats),
    /// Request failed.
    Error(ErrorMessage),
}

impl ServerMessage {
    /// Build an `error` event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorMessage {
            message: message.into(),
        })
    }

    /// Build the `game_paused` event sent when nobody is watching.
    pub fn paused_without_spectators() -> Self {
        Self::GamePaused(GamePaused {
            reason: NO_SPECTATORS_REASON.to_string(),
        })
    }
}

/// Reply to `create_room`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
    /// New room identifier.
    pub room_id: String,
    /// Room summary.
    pub room_info: RoomInfo,
}

/// Room summary wrapper.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Room summary.
    pub room_info: RoomInfo,
}

/// Reply to `leave_room`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomLeft {
    /// Room that was left.
    pub room_id: String,
}

/// Broadcast to a room when its second seat is taken.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoined {
    /// Player who took the seat.
    pub player: PlayerInfo,
    /// Room summary after the join.
    pub room_info: RoomInfo,
}

/// Broadcast to a room when a player leaves or drops.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeft {
    /// Player who left.
    pub player_id: String,
    /// Absent once the room has closed.
    pub room_info: Option<RoomInfo>,
}

/// Room summary plus every live session.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSessions {
    /// Room summary.
    pub room_info: RoomInfo,
    /// Session state per player, in seat order.
    #[schema(value_type = Object)]
    pub session_states: SessionStates,
}

/// One player's session after a command or automatic drop.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdate {
    /// Owner of the session.
    pub player_id: String,
    /// Session after the change.
    pub session_state: SessionState,
    /// Accepted commands so far.
    pub move_number: u64,
}

/// Sent when the automatic drop is suspended.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GamePaused {
    /// Human-readable cause.
    pub reason: String,
}

/// Room listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomList {
    /// Rooms in creation order.
    pub rooms: Vec<RoomInfo>,
}

/// Error reported to the caller only.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorMessage {
    /// Client-safe description.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_game_command() {
        let message = ClientMessage::from_json_str(
            r#"{"event":"game_command","data":{"playerId":"ana","cmd":"hard_drop"}}"#,
        )
        .unwrap();
        let ClientMessage::GameCommand(request) = message else {
            panic!("unexpected message");
        };
        assert_eq!(request.player_id, "ana");
        assert_eq!(request.cmd, GameCommand::HardDrop);
    }

    #[test]
    fn parses_events_without_payload() {
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"event":"list_rooms"}"#).unwrap(),
            ClientMessage::ListRooms
        ));
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"event":"get_stats"}"#).unwrap(),
            ClientMessage::GetStats
        ));
    }

    #[test]
    fn rejects_unknown_commands_and_events() {
        assert!(matches!(
            ClientMessage::from_json_str(
                r#"{"event":"game_command","data":{"playerId":"ana","cmd":"teleport"}}"#
            ),
            Err(InboundError::Malformed(_))
        ));
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"event":"dance","data":{}}"#),
            Err(InboundError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_invalid_payloads() {
        assert!(matches!(
            ClientMessage::from_json_str(
                r#"{"event":"create_room","data":{"playerId":"","name":"Ana"}}"#
            ),
            Err(InboundError::Invalid(_))
        ));
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"event":"spectate_room","data":{"roomId":"lobby"}}"#),
            Err(InboundError::Invalid(_))
        ));
    }

    #[test]
    fn outbound_events_use_event_and_data_keys() {
        let value = serde_json::to_value(ServerMessage::paused_without_spectators()).unwrap();
        assert_eq!(
            value,
            json!({ "event": "game_paused", "data": { "reason": "No spectators watching" } })
        );

        let value = serde_json::to_value(ServerMessage::RoomLeft(RoomLeft {
            room_id: "room_3".into(),
        }))
        .unwrap();
        assert_eq!(value, json!({ "event": "room_left", "data": { "roomId": "room_3" } }));

        let value = serde_json::to_value(ServerMessage::GameResumed).unwrap();
        assert_eq!(value, json!({ "event": "game_resumed" }));
    }
}
