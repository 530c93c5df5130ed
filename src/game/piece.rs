use rand::Rng;

use super::board::{BOARD_WIDTH, ColorId, MAX_COLOR, MIN_COLOR};

/// Number of gems stacked in a falling piece.
pub const PIECE_LEN: usize = 3;

/// Falling vertical triplet of gems under player control.
///
/// `colors[0]` sits at the anchor row `y` (the topmost cell), the remaining
/// colors occupy the rows directly below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    /// Gem colors from top to bottom.
    pub colors: [ColorId; PIECE_LEN],
    /// Anchor column.
    pub x: i32,
    /// Anchor row of the topmost gem.
    pub y: i32,
}

/// Absolute position and color of one gem of a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceCell {
    /// Column.
    pub x: i32,
    /// Row, 0 at the top.
    pub y: i32,
    /// Gem color.
    pub color: ColorId,
}

impl Piece {
    /// Build a piece with three independently random colors at the spawn point.
    pub fn spawn(rng: &mut impl Rng) -> Self {
        Self::with_colors([
            rng.random_range(MIN_COLOR..=MAX_COLOR),
            rng.random_range(MIN_COLOR..=MAX_COLOR),
            rng.random_range(MIN_COLOR..=MAX_COLOR),
        ])
    }

    /// Build a piece with explicit colors at the spawn point.
    pub fn with_colors(colors: [ColorId; PIECE_LEN]) -> Self {
        Self {
            colors,
            x: (BOARD_WIDTH / 2) as i32,
            y: 0,
        }
    }

    /// Cycle the colors so the bottom gem moves to the top.
    pub fn rotate(&mut self) {
        self.colors.rotate_right(1);
    }

    /// Absolute cells covered by the piece, shifted by the given offset.
    pub fn cells_at(&self, dx: i32, dy: i32) -> [PieceCell; PIECE_LEN] {
        std::array::from_fn(|i| PieceCell {
            x: self.x + dx,
            y: self.y + dy + i as i32,
            color: self.colors[i],
        })
    }

    /// Absolute cells covered by the piece at its current position.
    pub fn cells(&self) -> [PieceCell; PIECE_LEN] {
        self.cells_at(0, 0)
    }

    pub(crate) fn shift(&mut self, dx: i32, dy: i32) {
        self.x += dx;
        self.y += dy;
    }
}
