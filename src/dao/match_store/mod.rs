#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::{
    models::MatchEntity,
    storage::{StorageError, StorageResult},
};

/// Key under which the single match record is stored.
pub const MATCH_KEY: &str = "current";

/// Persistence for the one shared match record.
///
/// Writes are fenced on the version the caller read: a write based on a stale
/// read is rejected with [`StorageError::Conflict`] and never overwrites.
pub trait MatchStore: Send + Sync {
    /// Load the match record, if any.
    fn fetch_match(&self) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// Replace the record when its stored version equals `expected`, or create
    /// it when `expected` is `None` and nothing is stored yet.
    fn compare_and_swap(
        &self,
        expected: Option<u64>,
        next: MatchEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Check that the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Shared version check used by every backend before writing.
pub(crate) fn check_fence(
    expected: Option<u64>,
    actual: Option<u64>,
    next_version: u64,
) -> StorageResult<()> {
    if expected != actual {
        return Err(StorageError::Conflict { expected, actual });
    }
    if actual.is_some_and(|current| next_version <= current) {
        return Err(StorageError::Conflict { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_accepts_matching_versions_that_move_forward() {
        assert!(check_fence(None, None, 1).is_ok());
        assert!(check_fence(Some(3), Some(3), 4).is_ok());
    }

    #[test]
    fn fence_rejects_stale_or_blind_writes() {
        assert!(check_fence(Some(2), Some(3), 3).unwrap_err().is_conflict());
        assert!(check_fence(None, Some(1), 2).unwrap_err().is_conflict());
        assert!(check_fence(Some(1), None, 2).unwrap_err().is_conflict());
        assert!(check_fence(Some(3), Some(3), 3).unwrap_err().is_conflict());
    }
}
