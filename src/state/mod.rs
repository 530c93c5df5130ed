/// WebSocket writers and room groups.
pub mod hub;
/// Room directory.
pub mod registry;
/// Room aggregate.
pub mod room;
/// Automatic-drop tasks.
pub mod scheduler;
mod sse;
/// Room lifecycle.
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc, watch};

use crate::{
    config::AppConfig, dao::match_store::MatchStore, error::ServiceError,
    services::persistence::PersistJob,
};

pub use self::hub::ConnectionHub;
pub use self::registry::RoomRegistry;
pub use self::scheduler::RoomTick;
pub use self::sse::SseHub;

/// State shared by every handler and task.
pub type SharedState = Arc<AppState>;

/// Capacity of the presentation broadcast channel.
const PRESENTATION_CAPACITY: usize = 256;

/// Central application state: room directory, socket hub, presentation
/// stream and the optional match store.
pub struct AppState {
    config: Arc<AppConfig>,
    registry: RoomRegistry,
    hub: ConnectionHub,
    presentation: SseHub,
    match_store: RwLock<Option<Arc<dyn MatchStore>>>,
    degraded: watch::Sender<bool>,
    tick_reports: Mutex<Option<mpsc::UnboundedReceiver<RoomTick>>>,
    persistence: mpsc::UnboundedSender<PersistJob>,
    persistence_jobs: Mutex<Option<mpsc::UnboundedReceiver<PersistJob>>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a match store is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();

        Arc::new(Self {
            registry: RoomRegistry::new(config.drop_interval(), config.tick_interval(), tick_tx),
            config: Arc::new(config),
            hub: ConnectionHub::new(),
            presentation: SseHub::new(PRESENTATION_CAPACITY),
            match_store: RwLock::new(None),
            degraded: degraded_tx,
            tick_reports: Mutex::new(Some(tick_rx)),
            persistence: persist_tx,
            persistence_jobs: Mutex::new(Some(persist_rx)),
        })
    }

    /// Loaded configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Room directory.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// WebSocket connections.
    pub fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    /// Broadcast hub used for the public presentation stream.
    pub fn presentation(&self) -> &SseHub {
        &self.presentation
    }

    /// Obtain a handle to the current match store, if one is installed.
    pub async fn match_store(&self) -> Option<Arc<dyn MatchStore>> {
        let guard = self.match_store.read().await;
        guard.as_ref().cloned()
    }

    /// Match store to write to, or [`ServiceError::Degraded`] while storage is down.
    pub async fn require_match_store(&self) -> Result<Arc<dyn MatchStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.match_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a connected match store and leave degraded mode.
    pub async fn set_match_store(&self, store: Arc<dyn MatchStore>) {
        {
            let mut guard = self.match_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Queue a persistence job; it runs after the in-memory change, in order.
    pub fn persist(&self, job: PersistJob) {
        if self.persistence.send(job).is_err() {
            tracing::warn!("persistence worker gone; dropping job");
        }
    }

    /// Hand the tick report stream to the dispatcher. Only the first caller gets it.
    pub async fn take_tick_reports(&self) -> Option<mpsc::UnboundedReceiver<RoomTick>> {
        self.tick_reports.lock().await.take()
    }

    /// Hand the persistence queue to its worker. Only the first caller gets it.
    pub async fn take_persistence_jobs(&self) -> Option<mpsc::UnboundedReceiver<PersistJob>> {
        self.persistence_jobs.lock().await.take()
    }
}
