use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::{MatchEntity, MoveEntity};

pub const MATCH_PREFIX: &str = "match::";
pub const MOVE_PREFIX: &str = "move::";
/// Upper bound appended to a prefix for `_all_docs` range queries.
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Stored form of a match record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchMatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: MatchEntity,
}

impl CouchMatchDocument {
    pub fn from_entity(entity: MatchEntity) -> Self {
        Self {
            id: match_doc_id(entity.id),
            rev: None,
            body: entity,
        }
    }

    pub fn into_entity(self) -> MatchEntity {
        self.body
    }
}

/// Stored form of a move record. Moves are append-only, so no revision is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchMoveDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub body: MoveEntity,
}

impl CouchMoveDocument {
    pub fn from_entity(entity: MoveEntity) -> Self {
        Self {
            id: move_doc_id(entity.match_id, &entity.player_id, entity.move_number),
            body: entity,
        }
    }

    pub fn into_entity(self) -> MoveEntity {
        self.body
    }
}

pub fn match_doc_id(id: Uuid) -> String {
    format!("{MATCH_PREFIX}{id}")
}

/// Prefix shared by every move document of a match.
pub fn match_moves_prefix(match_id: Uuid) -> String {
    format!("{MOVE_PREFIX}{match_id}::")
}

/// Zero-padded move number keeps `_all_docs` ordering chronological per player.
pub fn move_doc_id(match_id: Uuid, player_id: &str, move_number: u64) -> String {
    format!("{}{player_id}::{move_number:010}", match_moves_prefix(match_id))
}
