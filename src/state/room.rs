use std::{
    collections::{HashMap, HashSet},
    time::{Duration, Instant, SystemTime},
};

use indexmap::IndexMap;
use thiserror::Error;
use uuid::Uuid;

use crate::game::{Cell, CommandOutcome, GameCommand, GameSession, SessionSnapshot};

use super::state_machine::{
    FinishReason, InvalidTransition, PlayState, RoomEvent, RoomPhase, RoomStateMachine,
};

/// Identifier chosen by the client for a player.
pub type PlayerId = String;
/// Server-allocated room identifier (`room_<n>`).
pub type RoomId = String;
/// Opaque identifier of a transport connection.
pub type ConnectionId = Uuid;

/// Seats available in a room.
pub const MAX_PLAYERS: usize = 2;

/// Domain failures raised by room and registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// No room with that id.
    #[error("room `{0}` not found")]
    RoomNotFound(RoomId),
    /// Both seats are taken.
    #[error("room is full")]
    RoomFull,
    /// The match has already begun.
    #[error("game already started")]
    AlreadyStarted,
    /// The player already holds a seat.
    #[error("player `{0}` is already in a room")]
    AlreadyInRoom(PlayerId),
    /// The player holds no seat here.
    #[error("player `{0}` is not in a room")]
    NotInRoom(PlayerId),
    /// No match is being played.
    #[error("game is not in progress")]
    NotInProgress,
    /// Commands are refused while nobody watches.
    #[error("game is paused: no spectators watching")]
    Paused,
    /// The player's session is over.
    #[error("game already finished")]
    Finished,
    /// Applying a command panicked.
    #[error("room `{0}` failed while applying a command")]
    Fault(RoomId),
    /// Lifecycle violation.
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// A seated player and the connection it plays from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Client-chosen identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Connection holding the seat.
    pub connection_id: ConnectionId,
}

/// Final score line of a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerScore {
    /// Player.
    pub player_id: PlayerId,
    /// Display name.
    pub name: String,
    /// Final score.
    pub score: u32,
}

/// Outcome of a finished match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// `None` on a tie.
    pub winner: Option<PlayerId>,
    /// Scores in seat order.
    pub scores: Vec<PlayerScore>,
    /// Why the match ended.
    pub reason: FinishReason,
}

/// What happened to the room when a player took a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Still waiting for an opponent.
    Seated,
    /// Second seat taken: sessions were created and the match began.
    Started,
}

/// Session state captured under the room lock, ready to be published.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    /// Owner of the session.
    pub player_id: PlayerId,
    /// Session state.
    pub snapshot: SessionSnapshot,
    /// Accepted moves of the player when the snapshot was taken.
    pub move_number: u64,
    /// Per-session revision the snapshot belongs to.
    pub revision: u64,
}

/// Result of applying a player command.
#[derive(Debug, Clone)]
pub struct CommandReport {
    /// Commanding player.
    pub player_id: PlayerId,
    /// What the command did.
    pub outcome: CommandOutcome,
    /// Session after the command.
    pub snapshot: SessionSnapshot,
    /// Accepted commands so far.
    pub move_number: u64,
    /// Session revision after the command.
    pub revision: u64,
    /// Set when this command ended the match.
    pub finished: Option<MatchResult>,
}

impl CommandReport {
    /// Snapshot of the commanded session for broadcasting.
    pub fn update(&self) -> SessionUpdate {
        SessionUpdate {
            player_id: self.player_id.clone(),
            snapshot: self.snapshot.clone(),
            move_number: self.move_number,
            revision: self.revision,
        }
    }
}

/// Sessions that changed during one scheduler tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Sessions whose piece fell or locked.
    pub updates: Vec<SessionUpdate>,
    /// Set when this tick ended the match.
    pub finished: Option<MatchResult>,
}

/// Board cells that changed for one player since the last emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardChanges {
    /// Board owner.
    pub player_id: PlayerId,
    /// Display name of the owner.
    pub player_name: String,
    /// Changed cells, `EMPTY` for cleared ones.
    pub cells: Vec<Cell>,
}

/// Match context for up to two players and any number of spectators.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    sequence: u64,
    created_at: SystemTime,
    players: Vec<Player>,
    sessions: IndexMap<PlayerId, GameSession>,
    spectators: HashSet<ConnectionId>,
    machine: RoomStateMachine,
    move_counters: HashMap<PlayerId, u64>,
    /// Bumped on every change of a session.
    revisions: HashMap<PlayerId, u64>,
    /// Latest revision handed to subscribers, per session.
    published: HashMap<PlayerId, u64>,
    match_id: Option<Uuid>,
    result: Option<MatchResult>,
    drop_interval: Duration,
}

impl Room {
    /// Open a room owned by its first player.
    pub fn new(id: RoomId, sequence: u64, creator: Player, drop_interval: Duration) -> Self {
        Self {
            id,
            sequence,
            created_at: SystemTime::now(),
            players: vec![creator],
            sessions: IndexMap::new(),
            spectators: HashSet::new(),
            machine: RoomStateMachine::new(),
            move_counters: HashMap::new(),
            revisions: HashMap::new(),
            published: HashMap::new(),
            match_id: None,
            result: None,
            drop_interval,
        }
    }

    /// Room identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation order, used to keep listings stable.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Wall-clock creation time.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Seated players in seat order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> RoomPhase {
        self.machine.phase()
    }

    /// Whether the match is in progress with nobody watching.
    pub fn is_paused(&self) -> bool {
        self.machine.is_paused()
    }

    /// Number of connections watching the room.
    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    /// Whether `connection_id` is watching the room.
    pub fn is_spectator(&self, connection_id: &ConnectionId) -> bool {
        self.spectators.contains(connection_id)
    }

    /// Identifier of the external match record, allocated when the match starts.
    pub fn match_id(&self) -> Option<Uuid> {
        self.match_id
    }

    /// Outcome once the match is finished.
    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    /// Current score of a seated player (0 before the match starts).
    pub fn score_of(&self, player_id: &str) -> u32 {
        self.sessions
            .get(player_id)
            .map(GameSession::score)
            .unwrap_or_default()
    }

    /// Accepted moves of a player so far.
    pub fn move_number(&self, player_id: &str) -> u64 {
        self.move_counters.get(player_id).copied().unwrap_or_default()
    }

    /// Revision of a player's session (0 before its first change).
    pub fn revision(&self, player_id: &str) -> u64 {
        self.revisions.get(player_id).copied().unwrap_or_default()
    }

    /// Record that the session state at `revision` is being published.
    ///
    /// Returns `false` when a newer state of the same session already went
    /// out, in which case the caller must drop its update.
    pub fn claim_publication(&mut self, player_id: &str, revision: u64) -> bool {
        let published = self.published.entry(player_id.to_string()).or_default();
        if revision < *published {
            return false;
        }
        *published = revision;
        true
    }

    /// Snapshots of every live session in seat order.
    pub fn session_snapshots(&self) -> IndexMap<PlayerId, SessionSnapshot> {
        self.sessions
            .iter()
            .map(|(id, session)| (id.clone(), session.snapshot()))
            .collect()
    }

    /// Seat a player, starting the match when the second seat is taken.
    pub fn add_player(&mut self, player: Player, now: Instant) -> Result<JoinOutcome, RoomError> {
        if self.players.len() >= MAX_PLAYERS {
            return Err(RoomError::RoomFull);
        }
        if self.machine.phase() != RoomPhase::Waiting {
            return Err(RoomError::AlreadyStarted);
        }
        if self.players.iter().any(|seated| seated.id == player.id) {
            return Err(RoomError::AlreadyInRoom(player.id));
        }

        self.players.push(player);
        if self.players.len() < MAX_PLAYERS {
            return Ok(JoinOutcome::Seated);
        }

        self.start(now)?;
        Ok(JoinOutcome::Started)
    }

    fn start(&mut self, now: Instant) -> Result<(), RoomError> {
        self.machine.apply(RoomEvent::Start {
            watched: !self.spectators.is_empty(),
        })?;

        for player in &self.players {
            self.sessions.insert(
                player.id.clone(),
                GameSession::new(self.drop_interval, now),
            );
            self.move_counters.insert(player.id.clone(), 0);
            self.revisions.insert(player.id.clone(), 0);
            self.published.insert(player.id.clone(), 0);
        }
        self.match_id = Some(Uuid::new_v4());
        Ok(())
    }

    /// Remove a seated player. Leaving a live match forfeits it.
    pub fn remove_player(&mut self, player_id: &str) -> Result<Option<MatchResult>, RoomError> {
        let index = self
            .players
            .iter()
            .position(|player| player.id == player_id)
            .ok_or_else(|| RoomError::NotInRoom(player_id.to_string()))?;

        let forfeit = if self.machine.is_in_progress() {
            Some(self.finish(FinishReason::Forfeit, Some(player_id))?)
        } else {
            None
        };

        self.players.remove(index);
        self.sessions.shift_remove(player_id);
        self.move_counters.remove(player_id);
        self.revisions.remove(player_id);
        self.published.remove(player_id);
        Ok(forfeit)
    }

    /// Register a spectator; returns `true` when this resumed a paused match.
    pub fn add_spectator(&mut self, connection_id: ConnectionId) -> Result<bool, RoomError> {
        if !self.spectators.insert(connection_id) {
            return Ok(false);
        }
        if self.machine.is_paused() {
            self.machine.apply(RoomEvent::SpectatorArrived)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Drop a spectator; returns `true` when this paused a running match.
    pub fn remove_spectator(&mut self, connection_id: &ConnectionId) -> Result<bool, RoomError> {
        if !self.spectators.remove(connection_id) {
            return Ok(false);
        }
        if self.spectators.is_empty() && self.machine.is_running() {
            self.machine.apply(RoomEvent::SpectatorsGone)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Forward a command to the player's session.
    pub fn apply_command(
        &mut self,
        player_id: &str,
        command: GameCommand,
    ) -> Result<CommandReport, RoomError> {
        match self.machine.phase() {
            RoomPhase::Waiting => return Err(RoomError::NotInProgress),
            RoomPhase::Finished(_) => return Err(RoomError::Finished),
            RoomPhase::InProgress(PlayState::Paused) => return Err(RoomError::Paused),
            RoomPhase::InProgress(PlayState::Running) => {}
        }

        let session = self
            .sessions
            .get_mut(player_id)
            .ok_or_else(|| RoomError::NotInRoom(player_id.to_string()))?;

        let outcome = session.apply_command(command);
        let snapshot = session.snapshot();
        let game_over = session.is_game_over();

        let counter = self.move_counters.entry(player_id.to_string()).or_default();
        let revision = self.revisions.entry(player_id.to_string()).or_default();
        if outcome.is_accepted() {
            *counter += 1;
            *revision += 1;
        }
        let move_number = *counter;
        let revision = *revision;

        let finished = if game_over {
            Some(self.finish(FinishReason::GameOver, None)?)
        } else {
            None
        };

        Ok(CommandReport {
            player_id: player_id.to_string(),
            outcome,
            snapshot,
            move_number,
            revision,
            finished,
        })
    }

    /// Advance automatic drops of both sessions.
    ///
    /// Returns `None` when the room is not running or nothing changed.
    pub fn tick(&mut self, now: Instant) -> Result<Option<TickReport>, RoomError> {
        if !self.machine.is_running() {
            return Ok(None);
        }

        let mut updates = Vec::new();
        for (player_id, session) in self.sessions.iter_mut() {
            if session.tick(now).is_none() {
                continue;
            }
            let revision = self.revisions.entry(player_id.clone()).or_default();
            *revision += 1;
            updates.push(SessionUpdate {
                player_id: player_id.clone(),
                snapshot: session.snapshot(),
                move_number: self.move_counters.get(player_id).copied().unwrap_or_default(),
                revision: *revision,
            });
        }

        let finished = if self.sessions.values().any(GameSession::is_game_over) {
            Some(self.finish(FinishReason::GameOver, None)?)
        } else {
            None
        };

        if updates.is_empty() && finished.is_none() {
            return Ok(None);
        }
        Ok(Some(TickReport { updates, finished }))
    }

    /// Changed board cells per player since the previous call.
    pub fn take_board_changes(&mut self) -> Vec<BoardChanges> {
        let mut changes = Vec::new();
        for player in &self.players {
            let Some(session) = self.sessions.get_mut(&player.id) else {
                continue;
            };
            let cells = session.take_board_diff();
            if !cells.is_empty() {
                changes.push(BoardChanges {
                    player_id: player.id.clone(),
                    player_name: player.name.clone(),
                    cells,
                });
            }
        }
        changes
    }

    /// Whether the room should be removed from the registry.
    pub fn should_close(&self) -> bool {
        self.players.is_empty() || (self.machine.is_finished() && self.spectators.is_empty())
    }

    /// Release every session; called when the room closes.
    pub fn release(&mut self) {
        self.sessions.clear();
        self.spectators.clear();
    }

    fn finish(
        &mut self,
        reason: FinishReason,
        leaving: Option<&str>,
    ) -> Result<MatchResult, RoomError> {
        self.machine.apply(RoomEvent::Finish(reason))?;

        let scores: Vec<PlayerScore> = self
            .players
            .iter()
            .map(|player| PlayerScore {
                player_id: player.id.clone(),
                name: player.name.clone(),
                score: self.score_of(&player.id),
            })
            .collect();

        let winner = match leaving {
            Some(leaving) => self
                .players
                .iter()
                .find(|player| player.id != leaving)
                .map(|player| player.id.clone()),
            None => strictly_highest(&scores),
        };

        let result = MatchResult {
            winner,
            scores,
            reason,
        };
        self.result = Some(result.clone());
        Ok(result)
    }
}

fn strictly_highest(scores: &[PlayerScore]) -> Option<PlayerId> {
    let best = scores.iter().max_by_key(|line| line.score)?;
    let tied = scores.iter().filter(|line| line.score == best.score).count() > 1;
    (!tied).then(|| best.player_id.clone())
}
