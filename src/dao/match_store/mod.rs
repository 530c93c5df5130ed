/// CouchDB-backed store.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// In-memory store for unit tests.
#[cfg(test)]
pub mod memory;

use crate::dao::models::{MatchEntity, MatchUpdateEntity, MoveEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for match history.
pub trait MatchStore: Send + Sync {
    /// Store the record of a match that just started.
    fn create_match(&self, record: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fold the final outcome into an existing match record.
    fn update_match(&self, update: MatchUpdateEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Append one accepted move.
    fn append_move(&self, record: MoveEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a single match record.
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// Every match whose outcome has been recorded, in no particular order.
    fn list_finished_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>>;
    /// Moves recorded for a match, in no particular order.
    fn match_moves(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<MoveEntity>>>;
    /// Verify the backend still answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend in place after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
