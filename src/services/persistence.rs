use std::time::SystemTime;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::{
        GridCellEntity, MatchEntity, MatchPlayerEntity, MatchStatus, MatchUpdateEntity, MoveEntity,
    },
    error::ServiceError,
    game::GameCommand,
    state::{
        SharedState,
        registry::StartedMatch,
        room::{CommandReport, MatchResult},
        state_machine::FinishReason,
    },
};

/// Write queued after an authoritative in-memory change.
#[derive(Debug, Clone)]
pub enum PersistJob {
    /// Record a match that just started.
    CreateMatch(MatchEntity),
    /// Store the final result of a match.
    UpdateMatch(MatchUpdateEntity),
    /// Record an accepted command.
    AppendMove(MoveEntity),
}

impl PersistJob {
    /// Record of a match that just started.
    pub fn create_match(room_id: &str, started: &StartedMatch) -> Self {
        let players = started
            .players
            .iter()
            .map(|player| MatchPlayerEntity {
                player_id: player.id.clone(),
                name: player.name.clone(),
                score: 0,
            })
            .collect();

        Self::CreateMatch(MatchEntity {
            id: started.match_id,
            room_id: room_id.to_string(),
            players,
            status: MatchStatus::InProgress,
            winner: None,
            finish_reason: None,
            started_at: SystemTime::now(),
            finished_at: None,
        })
    }

    /// Final outcome of a match.
    pub fn update_match(match_id: Uuid, result: &MatchResult) -> Self {
        let finish_reason = match result.reason {
            FinishReason::GameOver => "game_over",
            FinishReason::Forfeit => "forfeit",
        };

        Self::UpdateMatch(MatchUpdateEntity {
            id: match_id,
            status: MatchStatus::Finished,
            winner: result.winner.clone(),
            finish_reason: Some(finish_reason.to_string()),
            scores: result
                .scores
                .iter()
                .map(|line| MatchPlayerEntity {
                    player_id: line.player_id.clone(),
                    name: line.name.clone(),
                    score: line.score,
                })
                .collect(),
            finished_at: SystemTime::now(),
        })
    }

    /// Accepted command and the board it produced.
    pub fn append_move(match_id: Uuid, command: GameCommand, report: &CommandReport) -> Self {
        Self::AppendMove(MoveEntity {
            match_id,
            player_id: report.player_id.clone(),
            move_number: report.move_number,
            command: command.as_str().to_string(),
            grid: report
                .snapshot
                .cells
                .iter()
                .map(|cell| GridCellEntity {
                    x: cell.x,
                    y: cell.y,
                    color: cell.color,
                })
                .collect(),
            score: report.snapshot.score,
            recorded_at: SystemTime::now(),
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::CreateMatch(_) => "create_match",
            Self::UpdateMatch(_) => "update_match",
            Self::AppendMove(_) => "append_move",
        }
    }

    fn match_id(&self) -> Uuid {
        match self {
            Self::CreateMatch(record) => record.id,
            Self::UpdateMatch(update) => update.id,
            Self::AppendMove(record) => record.match_id,
        }
    }
}

/// Drain the persistence queue in submission order.
///
/// Jobs are skipped while degraded; failures are logged and never retried.
pub async fn run(state: SharedState, mut jobs: mpsc::UnboundedReceiver<PersistJob>) {
    while let Some(job) = jobs.recv().await {
        let kind = job.kind();
        let match_id = job.match_id();
        if let Err(err) = execute(&state, job).await {
            match err {
                ServiceError::Degraded => {
                    debug!(kind, %match_id, "storage degraded; skipping match write")
                }
                err => warn!(kind, %match_id, error = %err, "match write failed"),
            }
        }
    }
    debug!("persistence queue closed");
}

async fn execute(state: &SharedState, job: PersistJob) -> Result<(), ServiceError> {
    let store = state.require_match_store().await?;
    match job {
        PersistJob::CreateMatch(record) => store.create_match(record).await?,
        PersistJob::UpdateMatch(update) => store.update_match(update).await?,
        PersistJob::AppendMove(record) => store.append_move(record).await?,
    }
    Ok(())
}
