// src/orchestrator.rs
//! Drives one pipeline run: per category Fetch → Enrich → Rank, then one
//! combined Notify. At most one run (or manual trigger) is in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use futures::{future, stream, StreamExt};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::analyze::enhance::Enhancer;
use crate::analyze::gemini::{GeminiClient, TextGenerator};
use crate::analyze::summarize::Summarizer;
use crate::analyze::Enricher;
use crate::config::{DigestConfig, RankingConfig};
use crate::ingest::client::FeedClient;
use crate::ingest::content::ContentFetcher;
use crate::ingest::provider::{FeedProvider, RssFeedProvider};
use crate::ingest::{FetchLimits, FetchStage};
use crate::model::{Article, Category, EnrichedArticle};
use crate::notify::digest::DigestBuilder;
use crate::notify::slack::SlackNotifier;
use crate::notify::{Delivery, Notifier};
use crate::rank::select_top;
use crate::report::{CategoryReport, RunReport, MSG_NO_ARTICLES};
use crate::scheduler::RunSignal;
use crate::store::{ArticleRepository, MemoryStore};

/// Manual triggers flush a digest every this many articles.
pub const TRIGGER_BATCH: usize = 3;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_runs_total", "Pipeline runs by outcome.");
        describe_counter!("digest_runs_skipped_total", "Triggers ignored because a run was in flight.");
        describe_gauge!("digest_last_run_ts", "Unix time of the last finished run.");
        describe_histogram!("digest_run_ms", "Wall time of a full run in milliseconds.");
    });
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub categories: Vec<Category>,
    pub ranking: RankingConfig,
    pub enrich_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            categories: Category::ALL.to_vec(),
            ranking: RankingConfig::default(),
            enrich_concurrency: 2,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("a pipeline run is already in progress")]
    Busy,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TriggerReport {
    pub category: Option<Category>,
    pub processed: usize,
    pub failed: usize,
    pub batches_sent: usize,
}

pub struct Orchestrator {
    fetch: FetchStage,
    enricher: Enricher,
    delivery: Delivery,
    digest: DigestBuilder,
    articles: Arc<dyn ArticleRepository>,
    settings: PipelineSettings,
    run_guard: Mutex<()>,
    last_report: RwLock<Option<RunReport>>,
}

impl Orchestrator {
    pub fn new(
        fetch: FetchStage,
        enricher: Enricher,
        delivery: Delivery,
        digest: DigestBuilder,
        articles: Arc<dyn ArticleRepository>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            fetch,
            enricher,
            delivery,
            digest,
            articles,
            settings,
            run_guard: Mutex::new(()),
            last_report: RwLock::new(None),
        }
    }

    /// Wire the production stack (HTTP feeds, Gemini, Slack) over `store`.
    pub fn from_config(cfg: &DigestConfig, store: Arc<MemoryStore>) -> Result<Self> {
        let client = Arc::new(FeedClient::new(&cfg.fetch).context("building feed client")?);
        let providers: Vec<Arc<dyn FeedProvider>> = cfg
            .feeds
            .iter()
            .map(|f| {
                Arc::new(RssFeedProvider::from_url(f.source, f.category, f.url.clone(), client.clone()))
                    as Arc<dyn FeedProvider>
            })
            .collect();
        if providers.is_empty() {
            tracing::warn!(target: "pipeline", "no feeds configured; every category will fall back to cache");
        }

        let articles: Arc<dyn ArticleRepository> = store.clone();
        let fetch = FetchStage::new(providers, articles.clone(), FetchLimits::new(cfg.fetch.clone()));

        let generator: Arc<dyn TextGenerator> =
            Arc::new(GeminiClient::new(&cfg.ai).context("building generative api client")?);
        let summarizer = Summarizer::new(generator.clone(), cfg.summary.clone(), cfg.ai.summary_max_tokens);
        let enhancer = Enhancer::new(generator, store.clone(), cfg.ai.analysis_max_tokens);
        let mut enricher = Enricher::new(summarizer, enhancer, articles.clone(), store);
        if cfg.fetch.fetch_full_content {
            let fetcher = ContentFetcher::new(Duration::from_secs(cfg.fetch.content_timeout_secs))
                .context("building content fetcher")?;
            enricher = enricher.with_content_fetcher(fetcher, cfg.summary.substantial_content_chars);
        }

        let notifier: Arc<dyn Notifier> =
            Arc::new(SlackNotifier::from_config(&cfg.notify).context("building slack notifier")?);
        let delivery = Delivery::new(notifier, Duration::from_millis(cfg.notify.pacing_ms));

        let settings = PipelineSettings {
            categories: cfg.pipeline.parsed_categories(),
            ranking: cfg.ranking.clone(),
            enrich_concurrency: cfg.pipeline.enrich_concurrency,
        };

        Ok(Self::new(
            fetch,
            enricher,
            delivery,
            DigestBuilder::from_config(&cfg.notify),
            articles,
            settings,
        ))
    }

    pub fn categories(&self) -> &[Category] {
        &self.settings.categories
    }

    pub fn is_busy(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    pub async fn last_report(&self) -> Option<RunReport> {
        self.last_report.read().await.clone()
    }

    /// Full run over every configured category. Returns `None` when another
    /// run holds the guard (the trigger is dropped).
    pub async fn run(&self, cancel: &CancellationToken) -> Option<RunReport> {
        let categories = self.settings.categories.clone();
        self.run_categories(&categories, cancel).await
    }

    pub async fn run_categories(&self, categories: &[Category], cancel: &CancellationToken) -> Option<RunReport> {
        let span = tracing::info_span!("run", run_started = %Utc::now().format("%Y%m%dT%H%M%S"));
        self.run_locked(categories, cancel).instrument(span).await
    }

    async fn run_locked(&self, categories: &[Category], cancel: &CancellationToken) -> Option<RunReport> {
        ensure_metrics_described();
        let Ok(_guard) = self.run_guard.try_lock() else {
            tracing::info!(target: "pipeline", "run already in flight; trigger ignored");
            counter!("digest_runs_skipped_total").increment(1);
            return None;
        };

        let started = Instant::now();
        let executed_at = Utc::now();
        tracing::info!(target: "pipeline", categories = categories.len(), "pipeline run started");

        let mut reports = Vec::with_capacity(categories.len());
        let mut selected: Vec<EnrichedArticle> = Vec::new();
        for &category in categories {
            if cancel.is_cancelled() {
                reports.push(CategoryReport::failed(category, "Run cancelled before category started"));
                continue;
            }
            let (report, items) = self
                .process_category(category, cancel)
                .instrument(tracing::info_span!("category", %category))
                .await;
            selected.extend(items);
            reports.push(report);
        }

        let mut messages_sent = 0;
        let delivery_ok = if selected.is_empty() {
            None
        } else {
            let messages = self.digest.build_messages(&selected, Utc::now());
            let delivery = self.delivery.send(&messages).await;
            messages_sent = delivery.delivered;
            if delivery.is_success() {
                self.mark_delivered(&selected).await;
            }
            Some(delivery.is_success())
        };

        for r in &mut reports {
            if r.selected > 0 && delivery_ok == Some(true) {
                r.delivered = r.selected;
            }
            r.settle(if r.selected > 0 { delivery_ok } else { None });
        }

        let elapsed = started.elapsed();
        let report = RunReport::new(executed_at, reports, messages_sent, elapsed.as_millis() as u64);

        counter!("digest_runs_total", "outcome" => report.outcome.as_str()).increment(1);
        gauge!("digest_last_run_ts").set(Utc::now().timestamp() as f64);
        histogram!("digest_run_ms").record(elapsed.as_secs_f64() * 1000.0);
        tracing::info!(
            target: "pipeline",
            run_id = %report.run_id,
            outcome = report.outcome.as_str(),
            duration_ms = report.duration_ms,
            messages = messages_sent,
            "pipeline run finished\n{}",
            report.render_table()
        );

        *self.last_report.write().await = Some(report.clone());
        Some(report)
    }

    /// Fetch (with cache fallback), enrich, and rank one category.
    async fn process_category(
        &self,
        category: Category,
        cancel: &CancellationToken,
    ) -> (CategoryReport, Vec<EnrichedArticle>) {
        let started = Instant::now();
        let mut report = CategoryReport::new(category);
        let top_n = self.settings.ranking.top_n_for(category);

        let mut candidates = self.fetch.fetch_category(category).await;
        report.fetched = candidates.len();
        if candidates.is_empty() {
            candidates = self.cached_candidates(category, top_n).await;
            if candidates.is_empty() {
                tracing::warn!(target: "pipeline", %category, "{MSG_NO_ARTICLES}");
                let mut failed = CategoryReport::failed(category, MSG_NO_ARTICLES);
                failed.duration_ms = started.elapsed().as_millis() as u64;
                return (failed, Vec::new());
            }
            report.used_cache = true;
        }

        let total = candidates.len();
        let limit = self.settings.enrich_concurrency.max(1);
        let mut results = stream::iter(candidates)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|article| self.enricher.enrich(article))
            .buffered(limit);

        let mut enriched = Vec::with_capacity(total);
        let mut attempted = 0usize;
        while let Some(outcome) = results.next().await {
            attempted += 1;
            match outcome.error {
                None if outcome.summary_generated => report.summarized += 1,
                None => report.failed += 1,
                Some(e) => {
                    tracing::error!(
                        target: "pipeline",
                        error = ?e,
                        %category,
                        article = %outcome.item.article.id,
                        "enrichment failed; article kept with its summary"
                    );
                    report.failed += 1;
                    report.notes.push(format!("{e:#}"));
                }
            }
            enriched.push(outcome.item);
        }
        if attempted < total {
            tracing::warn!(target: "pipeline", %category, skipped = total - attempted, "run cancelled mid-category");
            report
                .notes
                .push(format!("Run cancelled; {} article(s) not processed", total - attempted));
        }

        let eligible: Vec<EnrichedArticle> = enriched.into_iter().filter(|e| e.article.has_summary()).collect();
        let selected = select_top(category, eligible, top_n.min(self.digest.per_category_cap()));
        report.selected = selected.len();
        report.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            target: "pipeline",
            %category,
            fetched = report.fetched,
            summarized = report.summarized,
            failed = report.failed,
            selected = report.selected,
            used_cache = report.used_cache,
            "category processed"
        );
        (report, selected)
    }

    /// Last resort when the fetch stage admitted nothing: recent, undelivered
    /// articles already in the store.
    async fn cached_candidates(&self, category: Category, top_n: usize) -> Vec<Article> {
        match self.articles.recent_by_category(category, top_n).await {
            Ok(recent) => {
                let cached: Vec<Article> = recent.into_iter().filter(|a| !a.is_delivered()).collect();
                if !cached.is_empty() {
                    tracing::info!(target: "pipeline", %category, count = cached.len(), "using cached articles");
                }
                cached
            }
            Err(e) => {
                tracing::warn!(target: "pipeline", error = %e, %category, "cache lookup failed");
                Vec::new()
            }
        }
    }

    async fn mark_delivered(&self, items: &[EnrichedArticle]) {
        let now = Utc::now();
        for item in items {
            let mut article = item.article.clone();
            article.delivered_at = Some(now);
            article.updated_at = now;
            if let Err(e) = self.articles.update_article(&article).await {
                tracing::warn!(target: "pipeline", error = %e, article = %article.id, "marking delivered failed");
            }
        }
    }

    /// Manual single-category run that streams the digest in batches of
    /// [`TRIGGER_BATCH`] articles instead of waiting for the whole category.
    pub async fn trigger_aggregation(
        &self,
        category: Category,
        cancel: &CancellationToken,
    ) -> Result<TriggerReport, TriggerError> {
        let _guard = self.run_guard.try_lock().map_err(|_| TriggerError::Busy)?;
        let mut report = TriggerReport {
            category: Some(category),
            ..TriggerReport::default()
        };

        let articles = self.fetch.fetch_category(category).await;
        if articles.is_empty() {
            tracing::info!(target: "pipeline", %category, "manual trigger found no new articles");
            return Ok(report);
        }

        let total = articles.len();
        let mut batch: Vec<EnrichedArticle> = Vec::with_capacity(TRIGGER_BATCH);
        for (i, article) in articles.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(target: "pipeline", %category, "manual trigger cancelled");
                break;
            }
            let outcome = self.enricher.enrich(article).await;
            match &outcome.error {
                None => report.processed += 1,
                Some(e) => {
                    tracing::error!(
                        target: "pipeline",
                        error = ?e,
                        %category,
                        article = %outcome.item.article.id,
                        "enrichment failed; article kept with its summary"
                    );
                    report.failed += 1;
                }
            }
            if outcome.item.article.has_summary() {
                batch.push(outcome.item);
            }
            if batch.len() >= TRIGGER_BATCH || i + 1 == total {
                self.flush_batch(&mut batch, &mut report).await;
            }
        }
        self.flush_batch(&mut batch, &mut report).await;

        tracing::info!(
            target: "pipeline",
            %category,
            processed = report.processed,
            failed = report.failed,
            batches = report.batches_sent,
            "manual trigger finished"
        );
        Ok(report)
    }

    async fn flush_batch(&self, batch: &mut Vec<EnrichedArticle>, report: &mut TriggerReport) {
        if batch.is_empty() {
            return;
        }
        let messages = self.digest.build_messages(batch, Utc::now());
        let delivery = self.delivery.send(&messages).await;
        if delivery.is_success() {
            self.mark_delivered(batch).await;
            report.batches_sent += 1;
        }
        batch.clear();
    }
}

/// Consume scheduler signals until cancelled. Each signal starts a run; a
/// signal that arrives while a run is in flight is dropped by the run guard.
pub fn spawn_signal_loop(
    orchestrator: Arc<Orchestrator>,
    mut signals: mpsc::Receiver<RunSignal>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let signal = tokio::select! {
                _ = cancel.cancelled() => break,
                s = signals.recv() => match s {
                    Some(s) => s,
                    None => break,
                },
            };
            tracing::info!(target: "pipeline", scheduled_for = %signal.scheduled_for, "scheduled run starting");
            if orchestrator.run(&cancel).await.is_none() {
                tracing::info!(target: "pipeline", "scheduled run skipped");
            }
        }
        tracing::info!(target: "pipeline", "signal loop stopped");
    })
}
