//! Client for the external cursor-paged transaction feed.
//!
//! The feed's `/transactions/sync` endpoint returns added/modified/removed
//! transaction lists plus a continuation cursor. The orchestrator owns the
//! page loop; this module fetches one page at a time.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::models::{FeedTransaction, RemovedFeedTransaction};

const PAGE_SIZE: u32 = 500;

/// Errors from the external feed. All are fatal to the sync call that hit
/// them; there is no automatic retry.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Feed HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Feed API request failed ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Failed to parse feed JSON response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One page of transaction updates.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedPage {
    #[serde(default)]
    pub added: Vec<FeedTransaction>,
    #[serde(default)]
    pub modified: Vec<FeedTransaction>,
    #[serde(default)]
    pub removed: Vec<RemovedFeedTransaction>,
    #[serde(default)]
    pub has_more: bool,
    pub next_cursor: String,
}

/// A paginated transaction feed.
#[async_trait::async_trait]
pub trait TransactionFeed: Send + Sync {
    /// Fetch the next page of updates. `None` cursor means initial full
    /// sync.
    async fn fetch_page(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<FeedPage, FeedError>;
}

/// HTTP implementation against the provider's sync API.
pub struct HttpTransactionFeed {
    client_id: SecretString,
    secret: SecretString,
    base_url: String,
    client: Client,
}

impl HttpTransactionFeed {
    /// A stalled feed would otherwise block the request thread
    /// indefinitely; every request carries this timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(
        base_url: impl Into<String>,
        client_id: SecretString,
        secret: SecretString,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client_id,
            secret,
            base_url: base_url.into(),
            client,
        })
    }

    async fn request<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, FeedError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let body_text = response.text().await?;

        if !status.is_success() {
            return Err(FeedError::Api {
                status,
                body: body_text,
            });
        }

        Ok(serde_json::from_str(&body_text)?)
    }
}

#[async_trait::async_trait]
impl TransactionFeed for HttpTransactionFeed {
    async fn fetch_page(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<FeedPage, FeedError> {
        #[derive(Serialize)]
        struct Options {
            include_personal_finance_category: bool,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            client_id: &'a str,
            secret: &'a str,
            access_token: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            cursor: Option<&'a str>,
            count: u32,
            options: Options,
        }

        self.request(
            "/transactions/sync",
            &Request {
                client_id: self.client_id.expose_secret(),
                secret: self.secret.expose_secret(),
                access_token,
                cursor,
                count: PAGE_SIZE,
                options: Options {
                    include_personal_finance_category: true,
                },
            },
        )
        .await
    }
}
