use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    game::{Cell, ColorId, Piece, SessionSnapshot},
    state::room::BoardChanges,
};

/// One board cell; `color` 0 means the cell was emptied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CellDto {
    /// Column.
    pub x: usize,
    /// Row, 0 at the top.
    pub y: usize,
    /// Gem color, 0 for an emptied cell.
    pub color: ColorId,
}

impl From<Cell> for CellDto {
    fn from(cell: Cell) -> Self {
        Self {
            x: cell.x,
            y: cell.y,
            color: cell.color,
        }
    }
}

/// Falling piece: colors from top to bottom and anchor of the top gem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PieceState {
    /// Gem colors from top to bottom.
    pub colors: Vec<ColorId>,
    /// Column of the piece.
    pub x: i32,
    /// Row of the top gem.
    pub y: i32,
}

impl From<&Piece> for PieceState {
    fn from(piece: &Piece) -> Self {
        Self {
            colors: piece.colors.to_vec(),
            x: piece.x,
            y: piece.y,
        }
    }
}

/// Snapshot of one player's session as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Sparse list of occupied cells.
    pub grid: Vec<CellDto>,
    /// Current score.
    pub score: u32,
    /// Falling piece.
    pub current_piece: PieceState,
    /// Colors of the upcoming piece.
    pub next_piece: Vec<ColorId>,
    /// Set once the spawn area is blocked.
    pub game_over: bool,
}

impl From<SessionSnapshot> for SessionState {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            grid: snapshot.cells.into_iter().map(CellDto::from).collect(),
            score: snapshot.score,
            current_piece: PieceState::from(&snapshot.current),
            next_piece: snapshot.next.to_vec(),
            game_over: snapshot.game_over,
        }
    }
}

/// Session states keyed by player id, in seat order.
pub type SessionStates = IndexMap<String, SessionState>;

/// Convert the room snapshots into their wire form.
pub fn session_states(snapshots: IndexMap<String, SessionSnapshot>) -> SessionStates {
    snapshots
        .into_iter()
        .map(|(player_id, snapshot)| (player_id, snapshot.into()))
        .collect()
}

/// Cells changed since the previous emission for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardDiff {
    /// Room the board belongs to.
    pub room_id: String,
    /// Owner of the board.
    pub player_id: String,
    /// Display name of the owner.
    pub player_name: String,
    /// Cells that changed since the previous diff.
    pub updated_nodes: Vec<CellDto>,
}

impl BoardDiff {
    /// Wrap a player's board changes for the presentation stream.
    pub fn new(room_id: &str, changes: BoardChanges) -> Self {
        Self {
            room_id: room_id.to_string(),
            player_id: changes.player_id,
            player_name: changes.player_name,
            updated_nodes: changes.cells.into_iter().map(CellDto::from).collect(),
        }
    }
}
