use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Lifecycle status stored on a match record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Match still being played.
    InProgress,
    /// Match ended with a result.
    Finished,
}

/// Player taking part in a recorded match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchPlayerEntity {
    /// Client-chosen player identifier.
    pub player_id: String,
    /// Display name at the time of the match.
    pub name: String,
    /// Score reached (0 until the match ends).
    pub score: u32,
}

/// Persistent record of a two-player match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    /// Identifier allocated by the room when the match started.
    pub id: Uuid,
    /// Room the match was played in.
    pub room_id: String,
    /// Both players in seat order.
    pub players: Vec<MatchPlayerEntity>,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Winning player, if the match ended with one.
    pub winner: Option<String>,
    /// Why the match ended (`game_over` or `forfeit`).
    pub finish_reason: Option<String>,
    /// When the second seat was taken.
    pub started_at: SystemTime,
    /// Set once the match is finished.
    pub finished_at: Option<SystemTime>,
}

/// Final outcome applied to an existing match record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchUpdateEntity {
    /// Match to update.
    pub id: Uuid,
    /// New status, normally `Finished`.
    pub status: MatchStatus,
    /// Winning player, `None` on a tie.
    pub winner: Option<String>,
    /// `game_over` or `forfeit`.
    pub finish_reason: Option<String>,
    /// Final scores keyed by player, in seat order.
    pub scores: Vec<MatchPlayerEntity>,
    /// When the match ended.
    pub finished_at: SystemTime,
}

/// Occupied cell stored with each move.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridCellEntity {
    /// Column.
    pub x: usize,
    /// Row, 0 at the top.
    pub y: usize,
    /// Gem color (1..=6).
    pub color: u8,
}

/// One accepted player command and the resulting board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveEntity {
    /// Match the move belongs to.
    pub match_id: Uuid,
    /// Player who issued the command.
    pub player_id: String,
    /// Per-player move counter after this move (starts at 1).
    pub move_number: u64,
    /// Command name (`move_left`, `hard_drop`, ...).
    pub command: String,
    /// Sparse grid after the move.
    pub grid: Vec<GridCellEntity>,
    /// Score after the move.
    pub score: u32,
    /// When the move was applied.
    pub recorded_at: SystemTime,
}

impl MatchEntity {
    /// Fold a final outcome into the record.
    pub fn apply_update(&mut self, update: MatchUpdateEntity) {
        self.status = update.status;
        self.winner = update.winner;
        self.finish_reason = update.finish_reason;
        self.finished_at = Some(update.finished_at);
        for line in update.scores {
            match self
                .players
                .iter_mut()
                .find(|player| player.player_id == line.player_id)
            {
                Some(player) => player.score = line.score,
                None => self.players.push(line),
            }
        }
    }
}
