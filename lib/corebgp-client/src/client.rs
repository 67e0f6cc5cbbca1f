//! HTTP client for the CoreBGP API

use crate::{ClientError, EventHandler, Result};
use async_trait::async_trait;
use corebgp_model::Announcement;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Desired-state source consumed by the updater
#[async_trait]
pub trait DesiredStateClient: Send + Sync {
    /// Fails unless the API answers its health endpoint with 200
    async fn health_check(&self) -> Result<()>;

    /// Full snapshot of every announcement across projects
    async fn get_all_announcements(&self) -> Result<Vec<Announcement>>;

    /// Stream announcement changes into `handler` until the connection ends
    /// or `cancel` fires. Malformed frames are dropped.
    async fn watch_announcements(
        &self,
        cancel: &CancellationToken,
        handler: &mut dyn EventHandler,
    ) -> Result<()>;
}

/// Standard response envelope of the API
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

/// API client over HTTP for requests and WebSocket for the watch stream
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
    timeout: Duration,
}

impl ApiClient {
    /// Create a client for `base_url` (http or https). Every request is bounded by `timeout`.
    ///
    /// A path in `base_url` is kept as a prefix of every API path.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).map_err(|_| ClientError::InvalidEndpoint(base_url.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidEndpoint(base_url.to_string()));
        }
        // join() replaces the last segment unless the base ends in a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            http,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|_| ClientError::InvalidEndpoint(format!("{}{}", self.base_url, path)))
    }

    /// WebSocket URL of the announcement watch stream
    pub fn watch_url(&self) -> Result<Url> {
        let mut url = self.endpoint("/v1/watch/announcements/")?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(ClientError::InvalidEndpoint(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidEndpoint(self.base_url.to_string()))?;
        Ok(url)
    }
}

/// Unwrap an API envelope, turning non-success statuses into errors
fn parse_envelope<T>(status: StatusCode, body: &str) -> Result<Option<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let envelope: ApiResponse<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => return Err(e.into()),
        Err(_) => {
            return Err(ClientError::Status {
                code: status.as_u16(),
                message: body.trim().to_string(),
            })
        }
    };

    if !status.is_success() {
        return Err(ClientError::Status {
            code: status.as_u16(),
            message: envelope.message,
        });
    }
    if envelope.status == "error" {
        return Err(ClientError::Api(envelope.message));
    }

    Ok(envelope.data)
}

#[async_trait]
impl DesiredStateClient for ApiClient {
    async fn health_check(&self) -> Result<()> {
        let response = self.http.get(self.endpoint("/healthz")?).send().await?;
        let status = response.status();

        if status != StatusCode::OK {
            return Err(ClientError::Status {
                code: status.as_u16(),
                message: "health check failed".to_string(),
            });
        }

        Ok(())
    }

    async fn get_all_announcements(&self) -> Result<Vec<Announcement>> {
        let response = self
            .http
            .get(self.endpoint("/v1/announcements/all")?)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        let announcements = parse_envelope::<Vec<Announcement>>(status, &body)?.unwrap_or_default();
        debug!("Fetched {} announcements from API", announcements.len());

        Ok(announcements)
    }

    async fn watch_announcements(
        &self,
        cancel: &CancellationToken,
        handler: &mut dyn EventHandler,
    ) -> Result<()> {
        self.watch(cancel, handler).await
    }
}
