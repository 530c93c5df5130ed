use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;
use futures::FutureExt;
use indexmap::IndexMap;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    dto::room::{PlayerInfo, RoomInfo, RoomStats},
    game::{GameCommand, SessionSnapshot},
};

use super::{
    room::{
        BoardChanges, CommandReport, ConnectionId, JoinOutcome, MatchResult, Player, PlayerId,
        Room, RoomError, RoomId, SessionUpdate,
    },
    scheduler::{RoomTick, SharedRoom, TickScheduler},
    state_machine::RoomPhase,
};

/// Predicate used by room listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomFilter {
    /// Every open room.
    All,
    /// Waiting or in progress.
    Active,
    /// Still waiting for a second player.
    Waiting,
}

impl RoomFilter {
    fn matches(self, phase: RoomPhase) -> bool {
        match self {
            Self::All => true,
            Self::Active => !matches!(phase, RoomPhase::Finished(_)),
            Self::Waiting => phase == RoomPhase::Waiting,
        }
    }
}

/// Match data captured when the second seat is taken.
#[derive(Debug, Clone)]
pub struct StartedMatch {
    /// Identifier of the new match record.
    pub match_id: Uuid,
    /// Whether the match starts without spectators.
    pub paused: bool,
    /// Both players in seat order.
    pub players: Vec<Player>,
    /// Fresh sessions in seat order.
    pub sessions: IndexMap<PlayerId, SessionSnapshot>,
}

/// Outcome of [`RoomRegistry::create`].
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    /// New room identifier.
    pub room_id: RoomId,
    /// Room summary.
    pub info: RoomInfo,
}

/// Outcome of [`RoomRegistry::join`].
#[derive(Debug, Clone)]
pub struct JoinedRoom {
    /// Room joined.
    pub room_id: RoomId,
    /// Player who took the seat.
    pub player: PlayerInfo,
    /// Room summary after the join.
    pub info: RoomInfo,
    /// Set when the join filled the room.
    pub started: Option<StartedMatch>,
}

/// Outcome of [`RoomRegistry::leave`].
#[derive(Debug, Clone)]
pub struct LeftRoom {
    /// Room that was left.
    pub room_id: RoomId,
    /// Player who left.
    pub player_id: PlayerId,
    /// `None` once the room closed.
    pub info: Option<RoomInfo>,
    /// Result when leaving forfeited a running match.
    pub forfeit: Option<MatchResult>,
    /// Match record to close.
    pub match_id: Option<Uuid>,
    /// Whether the room was removed.
    pub closed: bool,
}

/// Outcome of [`RoomRegistry::add_spectator`].
#[derive(Debug, Clone)]
pub struct Spectating {
    /// Room summary.
    pub info: RoomInfo,
    /// Current sessions in seat order.
    pub sessions: IndexMap<PlayerId, SessionSnapshot>,
    /// Whether automatic drops restarted.
    pub resumed: bool,
}

/// Outcome of [`RoomRegistry::remove_spectator`].
#[derive(Debug, Clone)]
pub struct Unwatched {
    /// Room that lost a spectator.
    pub room_id: RoomId,
    /// `None` once the room closed.
    pub info: Option<RoomInfo>,
    /// Whether automatic drops stopped.
    pub paused: bool,
    /// Whether the room was removed.
    pub closed: bool,
}

/// Outcome of [`RoomRegistry::apply_command`].
#[derive(Debug, Clone)]
pub struct AppliedCommand {
    /// Room the command was applied in.
    pub room_id: RoomId,
    /// Current match record, if any.
    pub match_id: Option<Uuid>,
    /// Effect on the player's session.
    pub report: CommandReport,
}

/// Everything a dropped connection was part of.
#[derive(Debug, Clone, Default)]
pub struct Disconnected {
    /// Seat that was given up.
    pub left: Option<LeftRoom>,
    /// Rooms the connection stopped watching.
    pub unwatched: Vec<Unwatched>,
}

/// Process-wide directory of rooms and their membership indexes.
///
/// Multi-index mutations run under `gate`, always acquired before a room lock.
/// Command routing skips the gate and only takes the room lock.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, SharedRoom>,
    players: DashMap<PlayerId, RoomId>,
    connections: DashMap<ConnectionId, PlayerId>,
    next_room: AtomicU64,
    gate: Mutex<()>,
    scheduler: TickScheduler,
    drop_interval: Duration,
}

impl RoomRegistry {
    /// Empty registry whose rooms report ticks to `reports`.
    pub fn new(
        drop_interval: Duration,
        tick_interval: Duration,
        reports: mpsc::UnboundedSender<RoomTick>,
    ) -> Self {
        Self {
            rooms: DashMap::new(),
            players: DashMap::new(),
            connections: DashMap::new(),
            next_room: AtomicU64::new(1),
            gate: Mutex::new(()),
            scheduler: TickScheduler::new(tick_interval, reports),
            drop_interval,
        }
    }

    /// Scheduler owning the per-room tick tasks.
    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    /// Room currently holding `player_id`.
    pub fn room_of(&self, player_id: &str) -> Option<RoomId> {
        self.players.get(player_id).map(|entry| entry.value().clone())
    }

    /// Player seated from `connection_id`.
    pub fn player_for_connection(&self, connection_id: &ConnectionId) -> Option<PlayerId> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.value().clone())
    }

    /// Number of open rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn room_handle(&self, room_id: &str) -> Result<SharedRoom, RoomError> {
        self.rooms
            .get(room_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))
    }

    fn handles(&self) -> Vec<(RoomId, SharedRoom)> {
        self.rooms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn ensure_unseated(&self, player: &Player) -> Result<(), RoomError> {
        if self.players.contains_key(&player.id) {
            return Err(RoomError::AlreadyInRoom(player.id.clone()));
        }
        if let Some(seated) = self.player_for_connection(&player.connection_id) {
            return Err(RoomError::AlreadyInRoom(seated));
        }
        Ok(())
    }

    /// Open a room owned by `player`.
    pub async fn create(&self, player: Player) -> Result<CreatedRoom, RoomError> {
        let _gate = self.gate.lock().await;
        self.ensure_unseated(&player)?;

        let sequence = self.next_room.fetch_add(1, Ordering::Relaxed);
        let room_id = format!("room_{sequence}");
        let room = Room::new(room_id.clone(), sequence, player.clone(), self.drop_interval);
        let info = RoomInfo::from(&room);

        self.rooms
            .insert(room_id.clone(), Arc::new(Mutex::new(room)));
        self.players.insert(player.id.clone(), room_id.clone());
        self.connections.insert(player.connection_id, player.id.clone());

        info!(room_id = %room_id, player_id = %player.id, "room created");
        Ok(CreatedRoom { room_id, info })
    }

    /// Seat `player` in an existing room, starting the match on the second seat.
    pub async fn join(&self, room_id: &str, player: Player) -> Result<JoinedRoom, RoomError> {
        let _gate = self.gate.lock().await;
        let handle = self.room_handle(room_id)?;
        self.ensure_unseated(&player)?;

        let mut room = handle.lock().await;
        let outcome = room.add_player(player.clone(), Instant::now())?;

        self.players.insert(player.id.clone(), room_id.to_string());
        self.connections.insert(player.connection_id, player.id.clone());

        let started = match (outcome, room.match_id()) {
            (JoinOutcome::Started, Some(match_id)) => {
                let paused = room.is_paused();
                self.scheduler.start(room_id, handle.clone(), paused);
                info!(room_id, %match_id, paused, "match started");
                Some(StartedMatch {
                    match_id,
                    paused,
                    players: room.players().to_vec(),
                    sessions: room.session_snapshots(),
                })
            }
            _ => None,
        };

        info!(room_id, player_id = %player.id, "player joined room");
        Ok(JoinedRoom {
            room_id: room_id.to_string(),
            player: PlayerInfo {
                score: room.score_of(&player.id),
                player_id: player.id,
                name: player.name,
            },
            info: RoomInfo::from(&*room),
            started,
        })
    }

    /// Remove `player_id` from its room, closing the room when eligible.
    pub async fn leave(&self, player_id: &str) -> Result<LeftRoom, RoomError> {
        let _gate = self.gate.lock().await;
        let room_id = self
            .room_of(player_id)
            .ok_or_else(|| RoomError::NotInRoom(player_id.to_string()))?;
        let handle = self.room_handle(&room_id)?;
        let mut room = handle.lock().await;

        let connection_id = room
            .players()
            .iter()
            .find(|player| player.id == player_id)
            .map(|player| player.connection_id);
        let forfeit = room.remove_player(player_id)?;

        self.players.remove(player_id);
        if let Some(connection_id) = connection_id {
            self.connections
                .remove_if(&connection_id, |_, seated| seated == player_id);
        }
        if forfeit.is_some() {
            self.scheduler.stop(&room_id);
            info!(room_id = %room_id, player_id, "match forfeited");
        }

        let match_id = room.match_id();
        let closed = room.should_close();
        let info = if closed {
            self.close_locked(&room_id, &mut room);
            None
        } else {
            Some(RoomInfo::from(&*room))
        };

        info!(room_id = %room_id, player_id, closed, "player left room");
        Ok(LeftRoom {
            room_id,
            player_id: player_id.to_string(),
            info,
            forfeit,
            match_id,
            closed,
        })
    }

    /// Register a spectator, resuming a paused schedule.
    pub async fn add_spectator(
        &self,
        room_id: &str,
        connection_id: ConnectionId,
    ) -> Result<Spectating, RoomError> {
        let _gate = self.gate.lock().await;
        let handle = self.room_handle(room_id)?;
        let mut room = handle.lock().await;

        let resumed = room.add_spectator(connection_id)?;
        if resumed {
            self.scheduler.set_paused(room_id, false);
            info!(room_id, "match resumed");
        }

        debug!(room_id, %connection_id, spectators = room.spectator_count(), "spectator added");
        Ok(Spectating {
            info: RoomInfo::from(&*room),
            sessions: room.session_snapshots(),
            resumed,
        })
    }

    /// Drop a spectator, pausing the schedule when nobody is left watching.
    pub async fn remove_spectator(
        &self,
        room_id: &str,
        connection_id: ConnectionId,
    ) -> Result<Unwatched, RoomError> {
        let _gate = self.gate.lock().await;
        let handle = self.room_handle(room_id)?;
        let mut room = handle.lock().await;

        let paused = room.remove_spectator(&connection_id)?;
        if paused {
            self.scheduler.set_paused(room_id, true);
            info!(room_id, "match paused: no spectators");
        }

        let closed = room.should_close();
        let info = if closed {
            self.close_locked(room_id, &mut room);
            None
        } else {
            Some(RoomInfo::from(&*room))
        };

        Ok(Unwatched {
            room_id: room_id.to_string(),
            info,
            paused,
            closed,
        })
    }

    /// Route a command to the room holding `player_id`.
    pub async fn apply_command(
        &self,
        player_id: &str,
        command: GameCommand,
    ) -> Result<AppliedCommand, RoomError> {
        let room_id = self
            .room_of(player_id)
            .ok_or_else(|| RoomError::NotInRoom(player_id.to_string()))?;
        let handle = self.room_handle(&room_id)?;

        isolate(&room_id, async {
            let mut room = handle.lock().await;
            let report = room.apply_command(player_id, command)?;
            if report.finished.is_some() {
                self.scheduler.stop(&room_id);
                info!(room_id = %room_id, player_id, "match finished by command");
            }

            Ok(AppliedCommand {
                match_id: room.match_id(),
                room_id: room_id.clone(),
                report,
            })
        })
        .await
    }

    /// Run `publish` under the room lock unless a newer state of the same
    /// session was already published. Returns whether `publish` ran.
    pub async fn publish_update(
        &self,
        room_id: &str,
        update: &SessionUpdate,
        publish: impl FnOnce(),
    ) -> bool {
        let Ok(handle) = self.room_handle(room_id) else {
            return false;
        };
        let mut room = handle.lock().await;
        if !room.claim_publication(&update.player_id, update.revision) {
            debug!(room_id, player_id = %update.player_id, revision = update.revision, "superseded session update dropped");
            return false;
        }
        publish();
        true
    }

    /// Close `room_id` if it has no players, or is finished with nobody watching.
    pub async fn close_if_eligible(&self, room_id: &str) -> bool {
        let _gate = self.gate.lock().await;
        let Ok(handle) = self.room_handle(room_id) else {
            return false;
        };
        let mut room = handle.lock().await;

        if matches!(room.phase(), RoomPhase::Finished(_)) {
            self.scheduler.stop(room_id);
        }
        if !room.should_close() {
            return false;
        }
        self.close_locked(room_id, &mut room);
        true
    }

    /// Clean up everything a dropped connection was part of: its seat and
    /// every room it was watching.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Disconnected {
        let mut outcome = Disconnected::default();

        if let Some(player_id) = self.player_for_connection(&connection_id) {
            match self.leave(&player_id).await {
                Ok(left) => outcome.left = Some(left),
                Err(err) => {
                    debug!(%connection_id, player_id = %player_id, error = %err, "leave on disconnect failed")
                }
            }
        }

        for (room_id, handle) in self.handles() {
            let watching = handle.lock().await.is_spectator(&connection_id);
            if !watching {
                continue;
            }
            match self.remove_spectator(&room_id, connection_id).await {
                Ok(unwatched) => outcome.unwatched.push(unwatched),
                Err(err) => {
                    debug!(%connection_id, room_id = %room_id, error = %err, "unwatch on disconnect failed")
                }
            }
        }

        outcome
    }

    /// Summary of one room.
    pub async fn room_info(&self, room_id: &str) -> Option<RoomInfo> {
        let handle = self.room_handle(room_id).ok()?;
        let room = handle.lock().await;
        Some(RoomInfo::from(&*room))
    }

    /// Summary plus live sessions of one room.
    pub async fn room_sessions(
        &self,
        room_id: &str,
    ) -> Option<(RoomInfo, IndexMap<PlayerId, SessionSnapshot>)> {
        let handle = self.room_handle(room_id).ok()?;
        let room = handle.lock().await;
        Some((RoomInfo::from(&*room), room.session_snapshots()))
    }

    /// Current move counter of a player in a room.
    pub async fn move_number(&self, room_id: &str, player_id: &str) -> u64 {
        match self.room_handle(room_id) {
            Ok(handle) => handle.lock().await.move_number(player_id),
            Err(_) => 0,
        }
    }

    /// Identifier of the match played in a room, once started.
    pub async fn match_id(&self, room_id: &str) -> Option<Uuid> {
        let handle = self.room_handle(room_id).ok()?;
        let room = handle.lock().await;
        room.match_id()
    }

    /// Board cells changed since the previous call, per player.
    pub async fn take_board_changes(&self, room_id: &str) -> Vec<BoardChanges> {
        match self.room_handle(room_id) {
            Ok(handle) => handle.lock().await.take_board_changes(),
            Err(_) => Vec::new(),
        }
    }

    /// Snapshot summaries of every room matching `filter`, in creation order.
    pub async fn list(&self, filter: RoomFilter) -> Vec<RoomInfo> {
        let mut rooms = Vec::new();
        for (_, handle) in self.handles() {
            let room = handle.lock().await;
            if filter.matches(room.phase()) {
                rooms.push((room.sequence(), RoomInfo::from(&*room)));
            }
        }
        rooms.sort_by_key(|(sequence, _)| *sequence);
        rooms.into_iter().map(|(_, info)| info).collect()
    }

    /// Aggregate counters over every open room.
    pub async fn stats(&self) -> RoomStats {
        let mut stats = RoomStats::default();
        for info in self.list(RoomFilter::All).await {
            stats.record(&info);
        }
        stats
    }

    /// Must run under the gate with the room lock held.
    fn close_locked(&self, room_id: &str, room: &mut Room) {
        self.scheduler.stop(room_id);
        for player in room.players() {
            self.players.remove(&player.id);
            self.connections
                .remove_if(&player.connection_id, |_, seated| *seated == player.id);
        }
        room.release();
        self.rooms.remove(room_id);
        info!(room_id, "room closed");
    }
}

/// Run work on a room, turning a panic into [`RoomError::Fault`] so the
/// failure stays inside that room.
async fn isolate<T>(
    room_id: &str,
    work: impl Future<Output = Result<T, RoomError>>,
) -> Result<T, RoomError> {
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            error!(room_id, "room operation panicked");
            Err(RoomError::Fault(room_id.to_string()))
        }
    }
}
