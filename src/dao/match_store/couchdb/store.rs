use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::dao::{
    match_store::{MatchStore, check_fence},
    models::MatchEntity,
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchMatchDocument, match_doc_id},
};

/// CouchDB backend: the `_rev` of the document read fences the PUT, and the
/// record version is checked before writing.
#[derive(Clone)]
pub struct CouchMatchStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

/// Outcome of a document PUT.
enum PutOutcome {
    Written,
    Conflict,
}

impl CouchMatchStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.with_auth(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);

        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .with_auth(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another instance created it in between.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<PutOutcome>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(PutOutcome::Conflict),
            status if status.is_success() => Ok(PutOutcome::Written),
            status => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status,
            }),
        }
    }

    async fn fetch(&self) -> CouchResult<Option<CouchMatchDocument>> {
        self.get_document::<CouchMatchDocument>(&match_doc_id())
            .await
    }

    async fn compare_and_swap(&self, expected: Option<u64>, next: MatchEntity) -> CouchResult<()> {
        let doc_id = match_doc_id();
        let existing = self.fetch().await?;
        let actual = existing.as_ref().map(|doc| doc.record.version);

        fence(expected, actual, next.version)?;

        let rev = existing.and_then(|doc| doc.rev);
        let document = CouchMatchDocument::from((next, rev));
        match self.put_document(&doc_id, &document).await? {
            PutOutcome::Written => Ok(()),
            PutOutcome::Conflict => {
                debug!(?expected, "couch rejected stale revision");
                let actual = self.fetch().await?.map(|doc| doc.record.version);
                Err(CouchDaoError::VersionConflict { expected, actual })
            }
        }
    }

    async fn ping(&self) -> CouchResult<()> {
        let url = format!("{}/{}", self.base_url, self.database);
        let response = self
            .with_auth(self.client.head(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: self.database.to_string(),
                source,
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::DatabaseStatus {
                database: self.database.to_string(),
                status: response.status(),
            })
        }
    }
}

impl MatchStore for CouchMatchStore {
    fn fetch_match(&self) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store.fetch().await?;
            Ok(document.map(|doc| doc.record))
        })
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
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}

/// Shared version fence, reported as a CouchDB conflict.
fn fence(expected: Option<u64>, actual: Option<u64>, next_version: u64) -> CouchResult<()> {
    check_fence(expected, actual, next_version)
        .map_err(|_| CouchDaoError::VersionConflict { expected, actual })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_reports_stale_and_backward_writes_as_conflicts() {
        assert!(fence(Some(4), Some(4), 5).is_ok());
        assert!(matches!(
            fence(Some(3), Some(4), 4),
            Err(CouchDaoError::VersionConflict {
                expected: Some(3),
                actual: Some(4)
            })
        ));
        assert!(matches!(
            fence(Some(4), Some(4), 4),
            Err(CouchDaoError::VersionConflict { .. })
        ));
        assert!(matches!(
            fence(None, Some(1), 2),
            Err(CouchDaoError::VersionConflict { .. })
        ));
    }
}
