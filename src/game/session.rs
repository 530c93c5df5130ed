use std::time::{Duration, Instant};

use rand::{SeedableRng, rngs::StdRng};

use super::{
    GameCommand,
    board::{Board, Cell, ColorId},
    piece::{PIECE_LEN, Piece},
};

/// Points awarded for every gem removed by a match.
pub const POINTS_PER_GEM: u32 = 10;

/// Result of a single downward step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// The piece moved one row down.
    Moved,
    /// The piece could not move and was locked into the board.
    Locked {
        /// Number of gems cleared by the match pass following the lock.
        cleared: usize,
    },
}

/// Observable effect of a player command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Nothing changed (wall or gem in the way, or the session is over).
    Rejected,
    /// The piece moved or rotated.
    Moved,
    /// The piece ended up locked into the board.
    Locked {
        /// Rows travelled before locking (0 when it was already resting).
        rows_fallen: u32,
        /// Number of gems cleared by the match pass.
        cleared: usize,
    },
}

impl CommandOutcome {
    /// Whether the command counts as an accepted move.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Immutable view of a session used for broadcasting and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Occupied cells, row by row.
    pub cells: Vec<Cell>,
    /// Current score.
    pub score: u32,
    /// Falling piece.
    pub current: Piece,
    /// Colors of the next piece.
    pub next: [ColorId; PIECE_LEN],
    /// Whether the session has ended.
    pub game_over: bool,
}

/// Board plus piece stream of a single player.
#[derive(Debug, Clone)]
pub struct GameSession {
    board: Board,
    current: Piece,
    next: Piece,
    score: u32,
    game_over: bool,
    drop_interval: Duration,
    last_auto_drop: Instant,
    last_emitted: Board,
    rng: StdRng,
}

impl GameSession {
    /// Start a fresh session on an empty board.
    pub fn new(drop_interval: Duration, started_at: Instant) -> Self {
        Self::with_rng(drop_interval, started_at, StdRng::from_os_rng())
    }

    /// Start a fresh session whose pieces are drawn from a seeded generator.
    pub fn with_seed(drop_interval: Duration, started_at: Instant, seed: u64) -> Self {
        Self::with_rng(drop_interval, started_at, StdRng::seed_from_u64(seed))
    }

    fn with_rng(drop_interval: Duration, started_at: Instant, mut rng: StdRng) -> Self {
        let current = Piece::spawn(&mut rng);
        let next = Piece::spawn(&mut rng);
        Self {
            board: Board::new(),
            current,
            next,
            score: 0,
            game_over: false,
            drop_interval,
            last_auto_drop: started_at,
            last_emitted: Board::new(),
            rng,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_parts(board: Board, current: Piece, next: Piece) -> Self {
        let mut session = Self::with_seed(Duration::from_millis(1_000), Instant::now(), 0);
        session.board = board;
        session.current = current;
        session.next = next;
        session
    }

    /// Current score.
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Whether the session has ended. Never reverts once set.
    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Read access to the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Piece currently under player control.
    pub fn current_piece(&self) -> &Piece {
        &self.current
    }

    /// Advance the automatic drop when the drop interval has elapsed.
    ///
    /// Returns the drop result when a step was performed.
    pub fn tick(&mut self, now: Instant) -> Option<DropOutcome> {
        if self.game_over {
            return None;
        }
        if now.saturating_duration_since(self.last_auto_drop) < self.drop_interval {
            return None;
        }

        let outcome = self.drop_once();
        self.last_auto_drop = now;
        Some(outcome)
    }

    /// Apply a player command to the current piece.
    pub fn apply_command(&mut self, command: GameCommand) -> CommandOutcome {
        if self.game_over {
            return CommandOutcome::Rejected;
        }

        match command {
            GameCommand::MoveLeft => self.try_shift(-1),
            GameCommand::MoveRight => self.try_shift(1),
            GameCommand::Rotate => {
                self.current.rotate();
                CommandOutcome::Moved
            }
            GameCommand::SoftDrop => match self.drop_once() {
                DropOutcome::Moved => CommandOutcome::Moved,
                DropOutcome::Locked { cleared } => CommandOutcome::Locked {
                    rows_fallen: 0,
                    cleared,
                },
            },
            GameCommand::HardDrop => {
                let mut rows_fallen = 0;
                loop {
                    match self.drop_once() {
                        DropOutcome::Moved => rows_fallen += 1,
                        DropOutcome::Locked { cleared } => {
                            break CommandOutcome::Locked {
                                rows_fallen,
                                cleared,
                            };
                        }
                    }
                }
            }
        }
    }

    /// Snapshot of the board, score and pieces.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            cells: self.board.occupied_cells(),
            score: self.score,
            current: self.current.clone(),
            next: self.next.colors,
            game_over: self.game_over,
        }
    }

    /// Cells that changed since the previous call, for the presentation layer.
    pub fn take_board_diff(&mut self) -> Vec<Cell> {
        let diff = self.board.diff(&self.last_emitted);
        self.last_emitted = self.board.clone();
        diff
    }

    fn try_shift(&mut self, dx: i32) -> CommandOutcome {
        if self.board.collides(&self.current.cells_at(dx, 0)) {
            return CommandOutcome::Rejected;
        }
        self.current.shift(dx, 0);
        CommandOutcome::Moved
    }

    fn drop_once(&mut self) -> DropOutcome {
        if !self.board.collides(&self.current.cells_at(0, 1)) {
            self.current.shift(0, 1);
            return DropOutcome::Moved;
        }

        let cleared = self.lock();
        DropOutcome::Locked { cleared }
    }

    /// Fix the current piece into the board, resolve matches once and spawn
    /// the next piece.
    fn lock(&mut self) -> usize {
        self.board.place(&self.current.cells());

        let cleared = self.board.clear_matches();
        if cleared > 0 {
            self.score += cleared as u32 * POINTS_PER_GEM;
            self.board.apply_gravity();
        }

        let upcoming = Piece::spawn(&mut self.rng);
        self.current = std::mem::replace(&mut self.next, upcoming);
        if self.board.collides(&self.current.cells()) {
            self.game_over = true;
        }

        cleared
    }
}
