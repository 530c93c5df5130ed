use std::collections::HashSet;

use super::piece::PieceCell;

/// Gem color identifier; [`EMPTY`] marks a free cell.
pub type ColorId = u8;

/// Value stored in cells without a gem.
pub const EMPTY: ColorId = 0;
/// Lowest valid gem color.
pub const MIN_COLOR: ColorId = 1;
/// Highest valid gem color.
pub const MAX_COLOR: ColorId = 6;

/// Number of columns of a board.
pub const BOARD_WIDTH: usize = 6;
/// Number of rows of a board; row 0 is the top.
pub const BOARD_HEIGHT: usize = 12;

/// Shortest run of equal colors that gets cleared.
const MIN_RUN: usize = 3;

/// Scan directions for runs: rows, columns, `\` diagonals and `/` diagonals.
const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (0, 1), (1, 1), (-1, 1)];

/// A non-empty (or changed) board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    /// Column.
    pub x: usize,
    /// Row, 0 at the top.
    pub y: usize,
    /// Gem color, `EMPTY` when cleared.
    pub color: ColorId,
}

/// Fixed 6x12 grid of gems owned by a single player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    columns: [[ColorId; BOARD_HEIGHT]; BOARD_WIDTH],
}

impl Default for Board {
    fn default() -> Self {
        Self {
            columns: [[EMPTY; BOARD_HEIGHT]; BOARD_WIDTH],
        }
    }
}

impl Board {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Color at `(x, y)`, or `None` when the coordinate lies outside the grid.
    pub fn get(&self, x: i32, y: i32) -> Option<ColorId> {
        let (x, y) = in_bounds(x, y)?;
        Some(self.columns[x][y])
    }

    #[cfg(test)]
    pub(crate) fn set(&mut self, x: usize, y: usize, color: ColorId) {
        self.columns[x][y] = color;
    }

    /// Whether `(x, y)` is outside the grid or already holds a gem.
    pub fn is_blocked(&self, x: i32, y: i32) -> bool {
        self.get(x, y).is_none_or(|color| color != EMPTY)
    }

    /// Whether any of the given piece cells would be blocked.
    pub fn collides(&self, cells: &[PieceCell]) -> bool {
        cells.iter().any(|cell| self.is_blocked(cell.x, cell.y))
    }

    /// Write piece cells into the grid, skipping cells above or below it.
    pub fn place(&mut self, cells: &[PieceCell]) {
        for cell in cells {
            if let Some((x, y)) = in_bounds(cell.x, cell.y) {
                self.columns[x][y] = cell.color;
            }
        }
    }

    /// Collect every coordinate belonging to a run of at least three equal
    /// gems along a row, column or diagonal.
    pub fn find_matches(&self) -> HashSet<(usize, usize)> {
        let mut matched = HashSet::new();

        for (dx, dy) in DIRECTIONS {
            for x in 0..BOARD_WIDTH as i32 {
                for y in 0..BOARD_HEIGHT as i32 {
                    let color = self.columns[x as usize][y as usize];
                    if color == EMPTY || self.get(x - dx, y - dy) == Some(color) {
                        // Empty, or not the first cell of its run.
                        continue;
                    }

                    let mut run = vec![(x as usize, y as usize)];
                    let (mut cx, mut cy) = (x + dx, y + dy);
                    while self.get(cx, cy) == Some(color) {
                        run.push((cx as usize, cy as usize));
                        cx += dx;
                        cy += dy;
                    }

                    if run.len() >= MIN_RUN {
                        matched.extend(run);
                    }
                }
            }
        }

        matched
    }

    /// Clear every matched gem in a single pass and return how many were removed.
    pub fn clear_matches(&mut self) -> usize {
        let matched = self.find_matches();
        for &(x, y) in &matched {
            self.columns[x][y] = EMPTY;
        }
        matched.len()
    }

    /// Let gems fall so every column is compacted at the bottom, preserving order.
    pub fn apply_gravity(&mut self) {
        for column in self.columns.iter_mut() {
            let mut write = BOARD_HEIGHT;
            for read in (0..BOARD_HEIGHT).rev() {
                if column[read] != EMPTY {
                    write -= 1;
                    column[write] = column[read];
                }
            }
            column[..write].fill(EMPTY);
        }
    }

    /// Sparse list of every non-empty cell, column by column.
    pub fn occupied_cells(&self) -> Vec<Cell> {
        self.cells().filter(|cell| cell.color != EMPTY).collect()
    }

    /// Cells whose color differs from `previous`, with their current color.
    pub fn diff(&self, previous: &Board) -> Vec<Cell> {
        self.cells()
            .filter(|cell| previous.columns[cell.x][cell.y] != cell.color)
            .collect()
    }

    fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.columns.iter().enumerate().flat_map(|(x, column)| {
            column
                .iter()
                .enumerate()
                .map(move |(y, &color)| Cell { x, y, color })
        })
    }
}

fn in_bounds(x: i32, y: i32) -> Option<(usize, usize)> {
    let x = usize::try_from(x).ok().filter(|x| *x < BOARD_WIDTH)?;
    let y = usize::try_from(y).ok().filter(|y| *y < BOARD_HEIGHT)?;
    Some((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: ColorId = 1;
    const GREEN: ColorId = 2;
    const BLUE: ColorId = 3;

    fn board_with(cells: &[(usize, usize, ColorId)]) -> Board {
        let mut board = Board::new();
        for &(x, y, color) in cells {
            board.set(x, y, color);
        }
        board
    }

    #[test]
    fn out_of_bounds_and_occupied_cells_block() {
        let board = board_with(&[(1, 11, RED)]);
        assert!(board.is_blocked(-1, 0));
        assert!(board.is_blocked(6, 0));
        assert!(board.is_blocked(0, 12));
        assert!(board.is_blocked(0, -1));
        assert!(board.is_blocked(1, 11));
        assert!(!board.is_blocked(1, 10));
    }

    #[test]
    fn place_skips_cells_outside_the_grid() {
        let mut board = Board::new();
        board.place(&[
            PieceCell { x: 2, y: -1, color: RED },
            PieceCell { x: 2, y: 0, color: GREEN },
        ]);
        assert_eq!(board.occupied_cells(), vec![Cell { x: 2, y: 0, color: GREEN }]);
    }

    #[test]
    fn horizontal_run_of_three_clears_only_the_run() {
        let mut board = board_with(&[(0, 0, RED), (1, 0, RED), (2, 0, RED), (3, 1, RED)]);
        assert_eq!(board.clear_matches(), 3);
        assert_eq!(board.occupied_cells(), vec![Cell { x: 3, y: 1, color: RED }]);
    }

    #[test]
    fn diagonal_run_is_detected() {
        let mut board = board_with(&[(0, 0, BLUE), (1, 1, BLUE), (2, 2, BLUE)]);
        assert_eq!(
            board.find_matches(),
            HashSet::from([(0, 0), (1, 1), (2, 2)])
        );
        assert_eq!(board.clear_matches(), 3);
        assert!(board.occupied_cells().is_empty());
    }

    #[test]
    fn anti_diagonal_run_is_detected() {
        let board = board_with(&[(5, 6, GREEN), (4, 7, GREEN), (3, 8, GREEN), (2, 9, GREEN)]);
        assert_eq!(board.find_matches().len(), 4);
    }

    #[test]
    fn vertical_run_at_the_bottom_is_detected() {
        let board = board_with(&[(4, 9, RED), (4, 10, RED), (4, 11, RED), (4, 8, BLUE)]);
        assert_eq!(
            board.find_matches(),
            HashSet::from([(4, 9), (4, 10), (4, 11)])
        );
    }

    #[test]
    fn crossing_runs_share_cells_once() {
        // A plus shape: row y=5 from x=1..=3 and column x=2 from y=4..=6.
        let mut board = board_with(&[
            (1, 5, RED),
            (2, 5, RED),
            (3, 5, RED),
            (2, 4, RED),
            (2, 6, RED),
        ]);
        assert_eq!(board.clear_matches(), 5);
    }

    #[test]
    fn runs_of_two_or_mixed_colors_do_not_match() {
        let board = board_with(&[(0, 11, RED), (1, 11, RED), (2, 11, GREEN), (3, 11, RED)]);
        assert!(board.find_matches().is_empty());
    }

    #[test]
    fn gravity_compacts_column_by_one_preserving_order() {
        let palette = [RED, GREEN, BLUE];
        let mut board = Board::new();
        for y in (0..BOARD_HEIGHT).filter(|y| *y != 5) {
            board.set(2, y, palette[y % palette.len()]);
        }
        let before = board.clone();

        board.apply_gravity();

        assert_eq!(board.get(2, 0), Some(EMPTY));
        for y in 0..5 {
            assert_eq!(board.get(2, y + 1), before.get(2, y));
        }
        for y in 6..BOARD_HEIGHT as i32 {
            assert_eq!(board.get(2, y), before.get(2, y));
        }
    }

    #[test]
    fn gravity_moves_floating_gems_to_the_floor() {
        let mut board = board_with(&[(0, 3, RED), (0, 7, GREEN), (5, 0, BLUE)]);
        board.apply_gravity();
        assert_eq!(
            board.occupied_cells(),
            vec![
                Cell { x: 0, y: 10, color: RED },
                Cell { x: 0, y: 11, color: GREEN },
                Cell { x: 5, y: 11, color: BLUE },
            ]
        );
    }

    #[test]
    fn diff_reports_changed_cells_including_cleared_ones() {
        let previous = board_with(&[(0, 11, RED), (1, 11, GREEN)]);
        let current = board_with(&[(1, 11, GREEN), (2, 11, BLUE)]);
        assert_eq!(
            current.diff(&previous),
            vec![
                Cell { x: 0, y: 11, color: EMPTY },
                Cell { x: 2, y: 11, color: BLUE },
            ]
        );
    }
}
