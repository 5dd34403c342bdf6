//! HTTP fetcher for the user-data service.

use crate::fetcher::Fetcher;
use crate::window::DateWindow;
use askwise_core::error::FetchError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// `GET {base_url}/{endpoint}` authenticated with the user's bearer token.
///
/// Windowed fetchers add `from` and `to` (ISO dates) as query parameters.
/// `204 No Content` and `404 Not Found` mean "no data", not an error.
pub struct HttpFetcher {
    client: Client,
    base_url: String,
    endpoint: String,
    accepts_window: bool,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            endpoint: endpoint.into(),
            accepts_window: false,
        }
    }

    /// Share a preconfigured client (timeouts, connection pool).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn windowed(mut self) -> Self {
        self.accepts_window = true;
        self
    }

    /// Build a client with the given request timeout.
    pub fn client_with_timeout(timeout: Duration) -> Result<Client, FetchError> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request {
                fetcher: "http".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })
    }

    fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn id(&self) -> &str {
        &self.endpoint
    }

    fn accepts_window(&self) -> bool {
        self.accepts_window
    }

    async fn fetch(
        &self,
        user_token: &str,
        window: Option<DateWindow>,
    ) -> Result<Option<Value>, FetchError> {
        let url = self.url();
        let mut request = self.client.get(&url).bearer_auth(user_token);
        if let Some(w) = window {
            request = request.query(&[("from", w.from.to_string()), ("to", w.to.to_string())]);
        }

        debug!(fetcher = %self.endpoint, url = %url, "Fetching user data");

        let response = request.send().await.map_err(|e| FetchError::Request {
            fetcher: self.endpoint.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                fetcher: self.endpoint.clone(),
                status_code: status.as_u16(),
            });
        }

        let payload: Value = response.json().await.map_err(|e| FetchError::Decode {
            fetcher: self.endpoint.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(payload))
    }
}
