use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use super::{MatchStore, check_fence};
use crate::dao::{models::MatchEntity, storage::StorageResult};

/// Process-local store, used by default and in tests.
#[derive(Clone, Default)]
pub struct InMemoryMatchStore {
    record: Arc<RwLock<Option<MatchEntity>>>,
}

impl InMemoryMatchStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchStore for InMemoryMatchStore {
    fn fetch_match(&self) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let record = self.record.clone();
        Box::pin(async move { Ok(record.read().await.clone()) })
    }

    fn compare_and_swap(
        &self,
        expected: Option<u64>,
        next: MatchEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let record = self.record.clone();
        Box::pin(async move {
            let mut guard = record.write().await;
            let actual = guard.as_ref().map(|stored| stored.version);
            check_fence(expected, actual, next.version)?;
            *guard = Some(next);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::match_state::MatchState;

    fn entity(version: u64) -> MatchEntity {
        let mut state = MatchState::lobby(vec!["ann".into()], 3);
        state.version = version;
        state.into()
    }

    #[tokio::test]
    async fn creates_then_updates_with_matching_version() {
        let store = InMemoryMatchStore::new();
        assert!(store.fetch_match().await.unwrap().is_none());

        store.compare_and_swap(None, entity(1)).await.unwrap();
        store.compare_and_swap(Some(1), entity(2)).await.unwrap();
        assert_eq!(store.fetch_match().await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn stale_write_is_rejected_and_keeps_the_record() {
        let store = InMemoryMatchStore::new();
        store.compare_and_swap(None, entity(1)).await.unwrap();
        store.compare_and_swap(Some(1), entity(2)).await.unwrap();

        let err = store.compare_and_swap(Some(1), entity(2)).await.unwrap_err();
        assert!(err.is_conflict());
        let err = store.compare_and_swap(None, entity(1)).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.fetch_match().await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn only_one_of_two_racing_writers_wins() {
        let store = InMemoryMatchStore::new();
        store.compare_and_swap(None, entity(1)).await.unwrap();

        let (left, right) = tokio::join!(
            store.compare_and_swap(Some(1), entity(2)),
            store.compare_and_swap(Some(1), entity(2)),
        );
        assert_eq!(usize::from(left.is_ok()) + usize::from(right.is_ok()), 1);
    }
}
