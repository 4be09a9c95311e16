//! Forum API client implementation

use async_trait::async_trait;
use cdk_core::error::ForumError;
use cdk_core::providers::{ForumClient, TopicSummary};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Forum used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://linux.do";

const API_KEY_HEADER: &str = "User-Api-Key";

/// Discourse HTTP client
#[derive(Clone)]
pub struct HttpForumClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HttpForumClient {
    /// Create a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ForumError::RequestFailed`] if the HTTP client cannot be
    /// built (TLS backend initialisation).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ForumError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForumError::RequestFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, ForumError> {
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| ForumError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status => {
                tracing::warn!(url = %url, status = status.as_u16(), "Forum request rejected");
                Err(ForumError::Status(status.as_u16()))
            }
        }
    }
}

#[async_trait]
impl ForumClient for HttpForumClient {
    async fn topic(&self, topic_id: u64) -> Result<TopicSummary, ForumError> {
        let url = format!("{}/t/{topic_id}.json", self.base_url);
        self.get(&url)
            .await?
            .json::<TopicSummary>()
            .await
            .map_err(|e| ForumError::Parse(e.to_string()))
    }

    async fn raw_post(&self, topic_id: u64, post_number: u64) -> Result<String, ForumError> {
        let url = format!("{}/raw/{topic_id}/{post_number}", self.base_url);
        self.get(&url)
            .await?
            .text()
            .await
            .map_err(|e| ForumError::RequestFailed(e.to_string()))
    }
}
