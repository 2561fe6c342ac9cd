// src/ingest/mod.rs
pub mod client;
pub mod content;
pub mod parser;
pub mod provider;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_histogram, gauge};
use once_cell::sync::OnceCell;

use crate::config::FetchConfig;
use crate::model::{Article, Category};
use crate::store::ArticleRepository;
use parser::FeedItem;
use provider::FeedProvider;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_fetched_total", "Feed items taken after the per-category cap.");
        describe_counter!("digest_admitted_total", "URL-novel articles admitted and persisted.");
        describe_counter!(
            "digest_duplicates_total",
            "Items rejected by the deduplication gate."
        );
        describe_counter!("digest_feed_errors_total", "Feed fetch/parse errors.");
        describe_counter!(
            "digest_persist_errors_total",
            "Batch persistence failures (admitted set kept in memory)."
        );
        describe_counter!("digest_items_skipped_total", "Feed items dropped for a missing link.");
        describe_counter!(
            "digest_transport_retries_total",
            "Retries after transient transport failures."
        );
        describe_histogram!("digest_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Decode entities, strip markup, normalize curly quotes, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Per-category cap on raw items taken from each feed.
#[derive(Debug, Clone)]
pub struct FetchLimits {
    cfg: FetchConfig,
}

impl FetchLimits {
    pub fn new(cfg: FetchConfig) -> Self {
        Self { cfg }
    }

    pub fn for_category(&self, category: Category) -> usize {
        self.cfg.max_articles_for(category)
    }
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self::new(FetchConfig::default())
    }
}

/// Feed fan-out, deduplication gate, and admission.
pub struct FetchStage {
    providers: Vec<Arc<dyn FeedProvider>>,
    articles: Arc<dyn ArticleRepository>,
    limits: FetchLimits,
}

impl FetchStage {
    pub fn new(
        providers: Vec<Arc<dyn FeedProvider>>,
        articles: Arc<dyn ArticleRepository>,
        limits: FetchLimits,
    ) -> Self {
        Self {
            providers,
            articles,
            limits,
        }
    }

    pub fn has_feeds_for(&self, category: Category) -> bool {
        self.providers.iter().any(|p| p.category() == category)
    }

    /// Fetch every feed of `category` concurrently and admit URL-novel items.
    ///
    /// Feed errors are logged and skipped. If persisting the admitted batch
    /// fails, the error is logged and the in-memory admitted set is still
    /// returned. The result may be empty.
    pub async fn fetch_category(&self, category: Category) -> Vec<Article> {
        ensure_metrics_described();

        let feeds: Vec<Arc<dyn FeedProvider>> = self
            .providers
            .iter()
            .filter(|p| p.category() == category)
            .cloned()
            .collect();
        if feeds.is_empty() {
            tracing::warn!(target: "ingest", %category, "no feeds configured");
            return Vec::new();
        }

        let results = join_all(feeds.iter().map(|p| p.fetch_items())).await;

        let limit = self.limits.for_category(category);
        let now = Utc::now();
        let mut per_feed = Vec::with_capacity(feeds.len());
        for (p, res) in feeds.iter().zip(results) {
            match res {
                Ok(items) => {
                    tracing::debug!(
                        target: "ingest",
                        source = %p.source(),
                        %category,
                        parsed = items.len(),
                        "feed fetched"
                    );
                    let articles: Vec<Article> = items.into_iter().map(|it| to_article(&**p, it, now)).collect();
                    per_feed.push(articles);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "ingest",
                        error = ?e,
                        source = %p.source(),
                        %category,
                        "feed error"
                    );
                    counter!("digest_feed_errors_total").increment(1);
                }
            }
        }
        let candidates = interleave_capped(per_feed, limit);
        counter!("digest_fetched_total").increment(candidates.len() as u64);

        let admitted = self.admit(candidates).await;
        if !admitted.is_empty() {
            if let Err(e) = self.articles.add_articles(&admitted).await {
                tracing::warn!(
                    target: "ingest",
                    error = %e,
                    %category,
                    count = admitted.len(),
                    "persisting admitted articles failed; continuing with in-memory set"
                );
                counter!("digest_persist_errors_total").increment(1);
            }
        }
        counter!("digest_admitted_total").increment(admitted.len() as u64);
        gauge!("digest_last_fetch_ts").set(now.timestamp() as f64);

        tracing::info!(target: "ingest", %category, admitted = admitted.len(), "fetch stage done");
        admitted
    }

    /// Deduplication gate: drop URLs already stored or repeated within the batch.
    /// A failed existence check admits the item; the store's unique URL
    /// constraint remains the final arbiter.
    async fn admit(&self, candidates: Vec<Article>) -> Vec<Article> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::with_capacity(candidates.len());
        let mut dup = 0u64;
        for a in candidates {
            if !seen.insert(a.url.clone()) {
                dup += 1;
                continue;
            }
            match self.articles.exists_by_url(&a.url).await {
                Ok(true) => dup += 1,
                Ok(false) => out.push(a),
                Err(e) => {
                    tracing::warn!(target: "ingest", error = %e, url = %a.url, "existence check failed");
                    out.push(a);
                }
            }
        }
        counter!("digest_duplicates_total").increment(dup);
        out
    }
}

/// Take items round-robin across feeds until `limit` items are collected, so
/// the category cap is shared fairly between sources.
fn interleave_capped(per_feed: Vec<Vec<Article>>, limit: usize) -> Vec<Article> {
    let mut iters: Vec<_> = per_feed.into_iter().map(Vec::into_iter).collect();
    let mut out = Vec::with_capacity(limit);
    while out.len() < limit {
        let before = out.len();
        for it in iters.iter_mut() {
            if out.len() == limit {
                break;
            }
            if let Some(a) = it.next() {
                out.push(a);
            }
        }
        if out.len() == before {
            break;
        }
    }
    out
}

fn to_article(p: &dyn FeedProvider, it: FeedItem, now: DateTime<Utc>) -> Article {
    let mut a = Article::new(p.source(), p.category(), it.title, it.url, it.published_at, now);
    a.content = it.description;
    a
}
