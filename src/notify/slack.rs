use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;

use super::Notifier;
use crate::config::NotifyConfig;
use crate::retry::{RetryPolicy, TransportError};

/// Slack incoming-webhook transport. Posts `{text, mrkdwn: true}`.
pub struct SlackNotifier {
    webhook_url: Option<String>,
    client: Client,
    retry: RetryPolicy,
}

impl SlackNotifier {
    pub fn from_config(cfg: &NotifyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building slack http client")?;
        let url = cfg.webhook_url.trim();
        Ok(Self {
            webhook_url: (!url.is_empty()).then(|| url.to_string()),
            client,
            retry: RetryPolicy {
                max_attempts: cfg.max_attempts,
                base_delay: Duration::from_millis(500),
            },
        })
    }

    /// Optional builder for tests/tools
    pub fn new(url: String) -> Self {
        Self {
            webhook_url: Some(url),
            client: Client::new(),
            retry: RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(500),
            },
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn post(&self, text: &str) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            return Err(anyhow!("slack webhook not configured"));
        };
        let body = serde_json::json!({ "text": text, "mrkdwn": true });

        self.retry
            .run("slack webhook", || async {
                let resp = self
                    .client
                    .post(url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(TransportError::from_reqwest)?;
                if resp.status().is_success() {
                    Ok(())
                } else {
                    Err(TransportError::from_status(resp.status()))
                }
            })
            .await
            .context("slack post")?;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}
