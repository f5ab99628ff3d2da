use crate::config::FetchConfig;
use crate::errors::FetchError;
use async_trait::async_trait;
use http::header::{COOKIE, USER_AGENT};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

/// Client headers forwarded on the feed fetch.
///
/// They are passed through untouched; the converter never inspects them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForwardedHeaders {
    pub user_agent: Option<String>,
    pub cookie: Option<String>,
}

/// Retrieves a remote document as text.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, headers: &ForwardedHeaders) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher bounded by a per-fetch timeout.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    default_user_agent: String,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;

        Ok(HttpFetcher {
            client,
            timeout: config.timeout(),
            default_user_agent: config.user_agent.clone(),
        })
    }

    async fn fetch_inner(&self, url: &Url, headers: &ForwardedHeaders) -> Result<String, FetchError> {
        let user_agent = headers
            .user_agent
            .as_deref()
            .unwrap_or(&self.default_user_agent);

        let mut request = self
            .client
            .get(url.clone())
            .header(USER_AGENT, user_agent);
        if let Some(cookie) = headers.cookie.as_deref().filter(|c| !c.is_empty()) {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        response.text().await.map_err(request_error)
    }
}

fn request_error(e: reqwest::Error) -> FetchError {
    FetchError::Request(e.without_url())
}

#[async_trait]
impl Fetcher for HttpFetcher {
    /// The timeout covers connecting, the response headers and the full body.
    async fn fetch(&self, url: &Url, headers: &ForwardedHeaders) -> Result<String, FetchError> {
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(FetchError::InvalidUrl(format!("unsupported scheme {other}"))),
        }

        timeout(self.timeout, self.fetch_inner(url, headers))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout.as_secs()))?
    }
}
