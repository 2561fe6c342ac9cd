// src/ingest/client.rs
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

use crate::config::FetchConfig;
use crate::retry::{RetryPolicy, TransportError};

/// HTTP GET for syndication documents, wrapped in the retry policy.
#[derive(Clone)]
pub struct FeedClient {
    http: Client,
    retry: RetryPolicy,
}

impl FeedClient {
    pub fn new(cfg: &FetchConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .connect_timeout(Duration::from_secs(cfg.timeout_secs.min(5)))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            http,
            retry: cfg.retry_policy(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn get_text(&self, url: &str) -> Result<String, TransportError> {
        self.retry
            .run(url, || async {
                let resp = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .map_err(TransportError::from_reqwest)?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(TransportError::from_status(status));
                }
                resp.text().await.map_err(TransportError::from_reqwest)
            })
            .await
    }
}
