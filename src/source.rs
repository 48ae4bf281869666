use crate::data::Dataset;
use crate::error::DataError;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Raw response handed back by a [`Transport`].
#[derive(Debug, Clone)]
pub struct Payload {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Payload {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs a single GET. Returns `Err` only when no response was received.
pub trait Transport: Send + Sync {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Payload, String>>;
}

/// [`Transport`] backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl Transport for ReqwestTransport {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Payload, String>> {
        Box::pin(async move {
            let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(|e| e.to_string())?;
            Ok(Payload {
                status,
                body: body.to_vec(),
            })
        })
    }
}

/// Where the app is running. Decides whether relative identifiers get the
/// published base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployment {
    Development,
    Published { base_path: String },
}

impl Deployment {
    pub fn base_path(&self) -> &str {
        match self {
            Self::Development => "",
            Self::Published { base_path } => base_path,
        }
    }
}

/// Joins `base` and `path` with exactly one slash between them. The result
/// always starts with `/`. An absolute path already under `base` is returned
/// as is; relative paths are always prefixed.
pub fn normalize(base: &str, path: &str) -> String {
    let base = base.trim_matches('/');
    let relative = path.trim_start_matches('/');
    if base.is_empty() {
        return format!("/{relative}");
    }
    if path.starts_with('/') && (relative == base || relative.starts_with(&format!("{base}/"))) {
        return format!("/{relative}");
    }
    format!("/{base}/{relative}")
}

fn is_absolute(identifier: &str) -> bool {
    identifier.starts_with("http://") || identifier.starts_with("https://")
}

/// Resolves and retrieves datasets for one deployment.
#[derive(Clone)]
pub struct DataSource {
    origin: String,
    deployment: Deployment,
    transport: Arc<dyn Transport>,
}

impl DataSource {
    pub fn new(origin: &str, deployment: Deployment, transport: Arc<dyn Transport>) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            deployment,
            transport,
        }
    }

    pub fn resolve(&self, identifier: &str) -> String {
        if is_absolute(identifier) {
            return identifier.to_string();
        }
        format!(
            "{}{}",
            self.origin,
            normalize(self.deployment.base_path(), identifier)
        )
    }

    pub async fn fetch_bytes(&self, identifier: &str) -> Result<Vec<u8>, DataError> {
        let url = self.resolve(identifier);
        debug!(identifier, %url, "Fetching dataset");

        let payload = self.transport.get(&url).await.map_err(|reason| {
            warn!(identifier, %url, %reason, "Dataset request failed");
            DataError::Transport {
                identifier: identifier.to_string(),
                reason,
            }
        })?;

        if !payload.is_success() {
            warn!(identifier, %url, status = payload.status, "Dataset request rejected");
            return Err(DataError::Network {
                identifier: identifier.to_string(),
                status: payload.status,
            });
        }
        Ok(payload.body)
    }

    pub async fn fetch<D: Dataset>(&self, identifier: &str) -> Result<D::Records, DataError> {
        let body = self.fetch_bytes(identifier).await?;
        D::decode(identifier, &body)
    }
}
