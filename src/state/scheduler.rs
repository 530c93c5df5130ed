use std::{
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use futures::FutureExt;
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, warn};

use super::room::{Room, RoomError, RoomId, TickReport};

/// Room handle shared between the registry and its ticker.
pub type SharedRoom = Arc<Mutex<Room>>;

/// Tick output forwarded to the dispatcher.
#[derive(Debug, Clone)]
pub struct RoomTick {
    /// Room that ticked.
    pub room_id: RoomId,
    /// What the tick changed.
    pub report: TickReport,
}

struct Ticker {
    handle: JoinHandle<()>,
    paused: watch::Sender<bool>,
}

/// Owns one periodic tick task per in-progress room.
pub struct TickScheduler {
    period: Duration,
    tickers: DashMap<RoomId, Ticker>,
    reports: mpsc::UnboundedSender<RoomTick>,
}

impl TickScheduler {
    /// Scheduler ticking every `period`, reporting on `reports`.
    pub fn new(period: Duration, reports: mpsc::UnboundedSender<RoomTick>) -> Self {
        Self {
            period,
            tickers: DashMap::new(),
            reports,
        }
    }

    /// Spawn the tick task of a room, replacing any previous one.
    pub fn start(&self, room_id: &str, room: SharedRoom, paused: bool) {
        let (paused_tx, paused_rx) = watch::channel(paused);
        let handle = tokio::spawn(run_ticker(
            room_id.to_string(),
            room,
            self.period,
            paused_rx,
            self.reports.clone(),
        ));

        let previous = self.tickers.insert(
            room_id.to_string(),
            Ticker {
                handle,
                paused: paused_tx,
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        debug!(room_id, paused, "tick schedule started");
    }

    /// Suspend or resume the schedule of a room.
    pub fn set_paused(&self, room_id: &str, paused: bool) {
        if let Some(ticker) = self.tickers.get(room_id) {
            ticker.paused.send_replace(paused);
            debug!(room_id, paused, "tick schedule toggled");
        }
    }

    /// Cancel the schedule of a room. No tick runs after this returns
    /// while the caller holds the room lock.
    pub fn stop(&self, room_id: &str) {
        if let Some((_, ticker)) = self.tickers.remove(room_id) {
            ticker.handle.abort();
            debug!(room_id, "tick schedule stopped");
        }
    }

    /// Whether a task runs for the room.
    pub fn is_scheduled(&self, room_id: &str) -> bool {
        self.tickers.contains_key(room_id)
    }

    /// Pause flag of the room's task, `None` when unscheduled.
    pub fn is_paused(&self, room_id: &str) -> Option<bool> {
        self.tickers.get(room_id).map(|ticker| *ticker.paused.borrow())
    }

    /// Whether no room is scheduled.
    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        for ticker in self.tickers.iter() {
            ticker.handle.abort();
        }
    }
}

async fn run_ticker(
    room_id: RoomId,
    room: SharedRoom,
    period: Duration,
    mut paused: watch::Receiver<bool>,
    reports: mpsc::UnboundedSender<RoomTick>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *paused.borrow_and_update() {
            if paused.wait_for(|paused| !*paused).await.is_err() {
                break;
            }
            interval.reset();
        }

        interval.tick().await;
        if *paused.borrow() {
            continue;
        }

        match AssertUnwindSafe(tick_room(&room)).catch_unwind().await {
            Ok(Ok(Some(report))) => {
                let finished = report.finished.is_some();
                if reports
                    .send(RoomTick {
                        room_id: room_id.clone(),
                        report,
                    })
                    .is_err()
                {
                    warn!(room_id = %room_id, "tick dispatcher gone; stopping schedule");
                    break;
                }
                if finished {
                    break;
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(err)) => warn!(room_id = %room_id, error = %err, "room tick failed"),
            Err(_) => error!(room_id = %room_id, "room tick panicked"),
        }
    }

    debug!(room_id = %room_id, "tick task exited");
}

async fn tick_room(room: &SharedRoom) -> Result<Option<TickReport>, RoomError> {
    let mut room = room.lock().await;
    room.tick(Instant::now())
}
