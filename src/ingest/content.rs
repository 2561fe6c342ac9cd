// src/ingest/content.rs
//! Best-effort retrieval of full article text.

use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Client;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Clone)]
pub struct ContentFetcher {
    http: Client,
}

impl ContentFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(BROWSER_UA)
            .timeout(timeout)
            .build()
            .context("building content http client")?;
        Ok(Self { http })
    }

    /// Page text for `url`, or `None` on any failure (non-2xx, timeout, empty page).
    pub async fn fetch(&self, url: &str) -> Option<String> {
        let resp = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(target: "ingest", error = %e, url, "content fetch failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            tracing::debug!(target: "ingest", status = resp.status().as_u16(), url, "content fetch non-2xx");
            return None;
        }
        let html = resp.text().await.ok()?;
        let text = extract_text(&html);
        (!text.is_empty()).then_some(text)
    }
}

/// Drop script/style blocks, strip markup, decode entities, collapse whitespace.
pub fn extract_text(html: &str) -> String {
    static RE_BLOCKS: OnceCell<Regex> = OnceCell::new();
    let re_blocks = RE_BLOCKS.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)>").unwrap()
    });
    let without_blocks = re_blocks.replace_all(html, " ");
    super::clean_text(&without_blocks)
}
