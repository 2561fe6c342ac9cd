// src/ingest/provider.rs
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use super::client::FeedClient;
use super::parser::{parse_feed, FeedItem};
use crate::model::{Category, Source};

/// One configured feed: a source publishing one category.
#[async_trait]
pub trait FeedProvider: Send + Sync {
    async fn fetch_items(&self) -> Result<Vec<FeedItem>>;
    fn source(&self) -> Source;
    fn category(&self) -> Category;
}

pub struct RssFeedProvider {
    source: Source,
    category: Category,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: Arc<FeedClient> },
}

impl RssFeedProvider {
    /// Serve a fixed document; used by tests and the preview tool.
    pub fn from_fixture(source: Source, category: Category, xml: &str) -> Self {
        Self {
            source,
            category,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(
        source: Source,
        category: Category,
        url: impl Into<String>,
        client: Arc<FeedClient>,
    ) -> Self {
        Self {
            source,
            category,
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }
}

#[async_trait]
impl FeedProvider for RssFeedProvider {
    async fn fetch_items(&self) -> Result<Vec<FeedItem>> {
        match &self.mode {
            Mode::Fixture(s) => parse_feed(s, Utc::now()),
            Mode::Http { url, client } => {
                let body = client
                    .get_text(url)
                    .await
                    .with_context(|| format!("{} {} feed get", self.source, self.category))?;
                parse_feed(&body, Utc::now())
                    .with_context(|| format!("{} {} feed parse", self.source, self.category))
            }
        }
    }

    fn source(&self) -> Source {
        self.source
    }

    fn category(&self) -> Category {
        self.category
    }
}
