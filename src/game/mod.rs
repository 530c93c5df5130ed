//! Falling-gem simulation: pieces, boards, match resolution and per-player sessions.

/// Grid, locking and match resolution.
pub mod board;
/// Falling three-gem piece.
pub mod piece;
/// Per-player game session.
pub mod session;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use self::board::{BOARD_HEIGHT, BOARD_WIDTH, Board, Cell, ColorId, EMPTY};
pub use self::piece::Piece;
pub use self::session::{CommandOutcome, DropOutcome, GameSession, SessionSnapshot};

/// Player input accepted by a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameCommand {
    /// Shift one column left.
    MoveLeft,
    /// Shift one column right.
    MoveRight,
    /// Cycle gem colors downward.
    Rotate,
    /// Fall one row, locking when blocked.
    SoftDrop,
    /// Fall until blocked, then lock.
    HardDrop,
}

impl GameCommand {
    /// Wire name of the command, also used in persisted move records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MoveLeft => "move_left",
            Self::MoveRight => "move_right",
            Self::Rotate => "rotate",
            Self::SoftDrop => "soft_drop",
            Self::HardDrop => "hard_drop",
        }
    }
}
