use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::{match_store::MATCH_KEY, models::MatchEntity};

/// Match record as stored in the `matches` collection. `version` stays at
/// the top level so the update filter can fence on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub stored_at: DateTime,
    #[serde(flatten)]
    pub record: MatchEntity,
}

impl From<MatchEntity> for MongoMatchDocument {
    fn from(record: MatchEntity) -> Self {
        Self {
            id: MATCH_KEY.to_owned(),
            stored_at: DateTime::from_system_time(record.updated_at),
            record,
        }
    }
}

pub fn key_filter() -> Document {
    doc! { "_id": MATCH_KEY }
}

pub fn version_filter(version: u64) -> Document {
    doc! { "_id": MATCH_KEY, "version": version as i64 }
}
