use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    error::{ErrorKind, WriteFailure},
};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoMatchDocument, key_filter, version_filter},
};
use crate::dao::{
    match_store::{MatchStore, check_fence},
    models::MatchEntity,
    storage::StorageResult,
};

const MATCH_COLLECTION_NAME: &str = "matches";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB backend fencing writes with a filter on `version`.
#[derive(Clone)]
pub struct MongoMatchStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    // Kept so the driver's connection pool lives as long as the database handle.
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoMatchStore {
    /// Connect and wait for the server to answer.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        Ok(Self { inner })
    }

    async fn collection(&self) -> Collection<MongoMatchDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoMatchDocument>(MATCH_COLLECTION_NAME)
    }

    async fn fetch(&self) -> MongoResult<Option<MatchEntity>> {
        let collection = self.collection().await;
        let document = collection
            .find_one(key_filter())
            .await
            .map_err(|source| MongoDaoError::LoadMatch { source })?;
        Ok(document.map(|doc| doc.record))
    }

    async fn stored_version(&self) -> MongoResult<Option<u64>> {
        Ok(self.fetch().await?.map(|record| record.version))
    }

    async fn compare_and_swap(&self, expected: Option<u64>, next: MatchEntity) -> MongoResult<()> {
        let collection = self.collection().await;
        let next_version = next.version;
        let document: MongoMatchDocument = next.into();

        match expected {
            None => match collection.insert_one(&document).await {
                Ok(_) => Ok(()),
                Err(err) if is_duplicate_key(&err) => Err(MongoDaoError::VersionConflict {
                    expected,
                    actual: self.stored_version().await?,
                }),
                Err(source) => Err(MongoDaoError::SaveMatch { source }),
            },
            Some(version) => {
                // The replace filter pins the stored version to `expected`.
                fence(expected, Some(version), next_version)?;
                let result = collection
                    .replace_one(version_filter(version), &document)
                    .await
                    .map_err(|source| MongoDaoError::SaveMatch { source })?;
                if result.matched_count == 0 {
                    let actual = self.stored_version().await?;
                    debug!(expected = version, ?actual, "match write lost the race");
                    return Err(MongoDaoError::VersionConflict { expected, actual });
                }
                Ok(())
            }
        }
    }
}

/// Shared version fence, reported as a MongoDB conflict.
fn fence(expected: Option<u64>, actual: Option<u64>, next_version: u64) -> MongoResult<()> {
    check_fence(expected, actual, next_version)
        .map_err(|_| MongoDaoError::VersionConflict { expected, actual })
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

impl MatchStore for MongoMatchStore {
    fn fetch_match(&self) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.fetch().await.map_err(Into::into) })
    }

    fn compare_and_swap(
        &self,
        expected: Option<u64>,
        next: MatchEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .compare_and_swap(expected, next)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_rejects_writes_that_do_not_move_forward() {
        assert!(fence(Some(7), Some(7), 8).is_ok());
        assert!(matches!(
            fence(Some(7), Some(7), 7),
            Err(MongoDaoError::VersionConflict {
                expected: Some(7),
                actual: Some(7)
            })
        ));
        assert!(matches!(
            fence(Some(7), Some(7), 3),
            Err(MongoDaoError::VersionConflict { .. })
        ));
    }
}
