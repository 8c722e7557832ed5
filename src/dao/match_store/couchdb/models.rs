use serde::{Deserialize, Serialize};

use crate::dao::{match_store::MATCH_KEY, models::MatchEntity};

pub const MATCH_PREFIX: &str = "match::";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchMatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub record: MatchEntity,
}

impl From<(MatchEntity, Option<String>)> for CouchMatchDocument {
    fn from((record, rev): (MatchEntity, Option<String>)) -> Self {
        Self {
            id: match_doc_id(),
            rev,
            record,
        }
    }
}

pub fn match_doc_id() -> String {
    format!("{MATCH_PREFIX}{MATCH_KEY}")
}
