mod config;
mod error;
mod models;
mod store;

pub use config::CouchConfig;
pub use error::CouchDaoError;
pub use store::CouchMatchStore;

use crate::dao::storage::StorageError;

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        match err {
            CouchDaoError::VersionConflict { expected, actual } => {
                StorageError::Conflict { expected, actual }
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
