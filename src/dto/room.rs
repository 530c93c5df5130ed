use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::format_system_time,
    state::{
        room::{MatchResult, PlayerScore, Room},
        state_machine::{FinishReason, RoomPhase},
    },
};

/// Coarse lifecycle status exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// One seat still free.
    Waiting,
    /// Match running or paused.
    InProgress,
    /// Match over, room kept open for spectators.
    Finished,
}

impl From<RoomPhase> for RoomStatus {
    fn from(phase: RoomPhase) -> Self {
        match phase {
            RoomPhase::Waiting => Self::Waiting,
            RoomPhase::InProgress(_) => Self::InProgress,
            RoomPhase::Finished(_) => Self::Finished,
        }
    }
}

/// Seated player as shown in room summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    /// Client-chosen identifier.
    pub player_id: String,
    /// Display name.
    pub name: String,
    /// Current score, 0 before the match starts.
    pub score: u32,
}

impl From<PlayerScore> for PlayerInfo {
    fn from(line: PlayerScore) -> Self {
        Self {
            player_id: line.player_id,
            name: line.name,
            score: line.score,
        }
    }
}

/// Read-only summary of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    /// Room identifier (`room_<n>`).
    pub room_id: String,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Whether automatic drops are suspended.
    pub is_paused: bool,
    /// Seats taken.
    pub player_count: usize,
    /// Connections watching.
    pub spectator_count: usize,
    /// Seated players in seat order.
    pub players: Vec<PlayerInfo>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl From<&Room> for RoomInfo {
    fn from(room: &Room) -> Self {
        Self {
            room_id: room.id().to_string(),
            status: room.phase().into(),
            is_paused: room.is_paused(),
            player_count: room.players().len(),
            spectator_count: room.spectator_count(),
            players: room
                .players()
                .iter()
                .map(|player| PlayerInfo {
                    player_id: player.id.clone(),
                    name: player.name.clone(),
                    score: room.score_of(&player.id),
                })
                .collect(),
            created_at: format_system_time(room.created_at()),
        }
    }
}

/// Aggregate counters over every open room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    /// Open rooms.
    pub total_rooms: usize,
    /// Rooms with a free seat.
    pub waiting_rooms: usize,
    /// Rooms with a match running or paused.
    pub in_progress_rooms: usize,
    /// Seated players across all rooms.
    pub total_players: usize,
    /// Spectators across all rooms.
    pub total_spectators: usize,
}

impl RoomStats {
    /// Fold one room summary into the counters.
    pub fn record(&mut self, info: &RoomInfo) {
        self.total_rooms += 1;
        match info.status {
            RoomStatus::Waiting => self.waiting_rooms += 1,
            RoomStatus::InProgress => self.in_progress_rooms += 1,
            RoomStatus::Finished => {}
        }
        self.total_players += info.player_count;
        self.total_spectators += info.spectator_count;
    }
}

/// Why a match ended, as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinishReasonDto {
    /// A board filled up.
    GameOver,
    /// A player left mid-match.
    Forfeit,
}

impl From<FinishReason> for FinishReasonDto {
    fn from(reason: FinishReason) -> Self {
        match reason {
            FinishReason::GameOver => Self::GameOver,
            FinishReason::Forfeit => Self::Forfeit,
        }
    }
}

/// Final outcome broadcast when a match ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameFinished {
    /// Room the match was played in.
    pub room_id: String,
    /// `None` on a tie.
    pub winner: Option<String>,
    /// Final scores in seat order.
    pub scores: Vec<PlayerInfo>,
    /// Why the match ended.
    pub reason: FinishReasonDto,
}

impl GameFinished {
    /// Wire form of a match result.
    pub fn new(room_id: &str, result: &MatchResult) -> Self {
        Self {
            room_id: room_id.to_string(),
            winner: result.winner.clone(),
            scores: result.scores.iter().cloned().map(PlayerInfo::from).collect(),
            reason: result.reason.into(),
        }
    }
}
