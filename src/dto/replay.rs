use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{GridCellEntity, MatchEntity, MatchPlayerEntity, MoveEntity},
    dto::{format_system_time, game::CellDto, room::PlayerInfo},
};

/// Finished match available for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    /// Match identifier.
    pub match_id: Uuid,
    /// Room the match was played in.
    pub room_id: String,
    /// Players in seat order with their final scores.
    pub players: Vec<PlayerInfo>,
    /// `None` on a tie.
    pub winner: Option<String>,
    /// `game_over` or `forfeit`.
    pub finish_reason: Option<String>,
    /// RFC 3339 timestamps.
    pub started_at: String,
    /// `None` while the record is incomplete.
    pub finished_at: Option<String>,
}

impl From<MatchEntity> for ReplaySummary {
    fn from(record: MatchEntity) -> Self {
        Self {
            match_id: record.id,
            room_id: record.room_id,
            players: record.players.into_iter().map(PlayerInfo::from).collect(),
            winner: record.winner,
            finish_reason: record.finish_reason,
            started_at: format_system_time(record.started_at),
            finished_at: record.finished_at.map(format_system_time),
        }
    }
}

impl From<MatchPlayerEntity> for PlayerInfo {
    fn from(player: MatchPlayerEntity) -> Self {
        Self {
            player_id: player.player_id,
            name: player.name,
            score: player.score,
        }
    }
}

/// One recorded move with the board it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplayMove {
    /// Player who issued the command.
    pub player_id: String,
    /// Per-player counter after the move.
    pub move_number: u64,
    /// Command name, e.g. `rotate`.
    pub command: String,
    /// Occupied cells after the move.
    pub grid: Vec<CellDto>,
    /// Score after the move.
    pub score: u32,
    /// RFC 3339 timestamp.
    pub recorded_at: String,
}

impl From<MoveEntity> for ReplayMove {
    fn from(record: MoveEntity) -> Self {
        Self {
            player_id: record.player_id,
            move_number: record.move_number,
            command: record.command,
            grid: record.grid.into_iter().map(CellDto::from).collect(),
            score: record.score,
            recorded_at: format_system_time(record.recorded_at),
        }
    }
}

impl From<GridCellEntity> for CellDto {
    fn from(cell: GridCellEntity) -> Self {
        Self {
            x: cell.x,
            y: cell.y,
            color: cell.color,
        }
    }
}

/// Full move history of a match, in the order the moves were played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Replay {
    /// Match summary, serialized as `match`.
    #[serde(rename = "match")]
    pub summary: ReplaySummary,
    /// Recorded moves.
    pub moves: Vec<ReplayMove>,
}
