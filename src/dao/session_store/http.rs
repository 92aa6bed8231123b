use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};

use crate::dao::{
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

/// Connection settings for [`HttpSessionStore`].
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// Base URL of the cache service, e.g. `http://localhost:7700`.
    pub base_url: String,
    /// Keyspace under which all keys are namespaced.
    pub namespace: String,
    /// Optional bearer token.
    pub token: Option<String>,
}

/// [`SessionStore`] backed by an external HTTP key/value cache.
///
/// Keys live under `/{namespace}/{key}`; TTLs are passed as a query
/// parameter and enforced by the cache service.
#[derive(Clone)]
pub struct HttpSessionStore {
    client: Client,
    base_url: Arc<str>,
    namespace: Arc<str>,
    token: Option<Arc<str>>,
}

#[derive(Debug, thiserror::Error)]
#[error("unexpected status {0}")]
struct UnexpectedStatus(StatusCode);

impl HttpSessionStore {
    /// Build a client and probe the cache service once.
    pub async fn connect(config: SessionStoreConfig) -> StorageResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| StorageError::unavailable("building HTTP client".into(), source))?;

        let store = Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            namespace: Arc::from(config.namespace.as_str()),
            token: config.token.map(Arc::from),
        };

        store.ping().await?;
        Ok(store)
    }

    fn request(&self, method: Method, key: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.namespace, key);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token.as_ref()),
            None => builder,
        }
    }

    async fn ping(&self) -> StorageResult<()> {
        let url = format!("{}/health", self.base_url);
        let mut builder = self.client.get(&url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.as_ref());
        }

        let response = builder
            .send()
            .await
            .map_err(|source| StorageError::unavailable("cache health probe".into(), source))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StorageError::unavailable(
                "cache health probe".into(),
                UnexpectedStatus(response.status()),
            ))
        }
    }
}

impl SessionStore for HttpSessionStore {
    fn get(&self, key: String) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let this = self.clone();
        Box::pin(async move {
            let response = this
                .request(Method::GET, &key)
                .send()
                .await
                .map_err(|source| StorageError::unavailable(format!("GET {key}"), source))?;

            match response.status() {
                StatusCode::NOT_FOUND => Ok(None),
                status if status.is_success() => {
                    let body = response
                        .text()
                        .await
                        .map_err(|source| StorageError::unavailable(format!("GET {key}"), source))?;
                    Ok(Some(body))
                }
                status => Err(StorageError::unavailable(
                    format!("GET {key} returned {status}"),
                    UnexpectedStatus(status),
                )),
            }
        })
    }

    fn set(
        &self,
        key: String,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let this = self.clone();
        Box::pin(async move {
            let response = this
                .request(Method::PUT, &key)
                .query(&[("ttl", ttl.as_secs())])
                .body(value)
                .send()
                .await
                .map_err(|source| StorageError::unavailable(format!("PUT {key}"), source))?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(StorageError::unavailable(
                    format!("PUT {key} returned {}", response.status()),
                    UnexpectedStatus(response.status()),
                ))
            }
        })
    }

    fn delete(&self, key: String) -> BoxFuture<'static, StorageResult<()>> {
        let this = self.clone();
        Box::pin(async move {
            let response = this
                .request(Method::DELETE, &key)
                .send()
                .await
                .map_err(|source| StorageError::unavailable(format!("DELETE {key}"), source))?;

            match response.status() {
                StatusCode::NOT_FOUND => Ok(()),
                status if status.is_success() => Ok(()),
                status => Err(StorageError::unavailable(
                    format!("DELETE {key} returned {status}"),
                    UnexpectedStatus(status),
                )),
            }
        })
    }

    fn exists(&self, key: String) -> BoxFuture<'static, StorageResult<bool>> {
        let this = self.clone();
        Box::pin(async move {
            let response = this
                .request(Method::HEAD, &key)
                .send()
                .await
                .map_err(|source| StorageError::unavailable(format!("HEAD {key}"), source))?;

            match response.status() {
                StatusCode::NOT_FOUND => Ok(false),
                status if status.is_success() => Ok(true),
                status => Err(StorageError::unavailable(
                    format!("HEAD {key} returned {status}"),
                    UnexpectedStatus(status),
                )),
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let this = self.clone();
        Box::pin(async move { this.ping().await })
    }
}
