use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::dao::{
    match_store::MatchStore,
    models::{MatchEntity, MatchStatus, MatchUpdateEntity, MoveEntity},
    storage::{StorageError, StorageResult},
};

#[derive(Debug, thiserror::Error)]
#[error("match `{0}` not found")]
struct MissingMatch(Uuid);

/// Match store kept in process memory, used by tests.
#[derive(Clone, Default)]
pub struct MemoryMatchStore {
    matches: Arc<Mutex<IndexMap<Uuid, MatchEntity>>>,
    moves: Arc<Mutex<Vec<MoveEntity>>>,
}

impl MemoryMatchStore {
    pub fn matches(&self) -> Vec<MatchEntity> {
        self.matches.lock().unwrap().values().cloned().collect()
    }

    pub fn moves(&self) -> Vec<MoveEntity> {
        self.moves.lock().unwrap().clone()
    }
}

impl MatchStore for MemoryMatchStore {
    fn create_match(&self, record: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let matches = self.matches.clone();
        Box::pin(async move {
            matches.lock().unwrap().insert(record.id, record);
            Ok(())
        })
    }

    fn update_match(&self, update: MatchUpdateEntity) -> BoxFuture<'static, StorageResult<()>> {
        let matches = self.matches.clone();
        Box::pin(async move {
            let mut guard = matches.lock().unwrap();
            let id = update.id;
            let record = guard.get_mut(&id).ok_or_else(|| {
                StorageError::unavailable(format!("match `{id}` not found"), MissingMatch(id))
            })?;
            record.apply_update(update);
            Ok(())
        })
    }

    fn append_move(&self, record: MoveEntity) -> BoxFuture<'static, StorageResult<()>> {
        let moves = self.moves.clone();
        Box::pin(async move {
            moves.lock().unwrap().push(record);
            Ok(())
        })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let matches = self.matches.clone();
        Box::pin(async move { Ok(matches.lock().unwrap().get(&id).cloned()) })
    }

    fn list_finished_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let matches = self.matches.clone();
        Box::pin(async move {
            Ok(matches
                .lock()
                .unwrap()
                .values()
                .filter(|record| record.status == MatchStatus::Finished)
                .cloned()
                .collect())
        })
    }

    fn match_moves(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<MoveEntity>>> {
        let moves = self.moves.clone();
        Box::pin(async move {
            Ok(moves
                .lock()
                .unwrap()
                .iter()
                .filter(|record| record.match_id == match_id)
                .cloned()
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
