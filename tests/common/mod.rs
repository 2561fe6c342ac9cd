// tests/common/mod.rs
//
// Shared builders for the integration tests: fixtures, a scripted text
// generator, a recording notifier, and a fully wired orchestrator.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use news_digest::analyze::enhance::Enhancer;
use news_digest::analyze::gemini::{DegradeReason, Generated, TextGenerator};
use news_digest::analyze::summarize::Summarizer;
use news_digest::analyze::Enricher;
use news_digest::config::{FetchConfig, RankingConfig, SummaryConfig};
use news_digest::ingest::provider::{FeedProvider, RssFeedProvider};
use news_digest::ingest::{FetchLimits, FetchStage};
use news_digest::model::{Article, Category, Source};
use news_digest::notify::digest::DigestBuilder;
use news_digest::notify::{Delivery, Notifier};
use news_digest::orchestrator::{Orchestrator, PipelineSettings};
use news_digest::store::{ArticleRepository, KnowledgeRepository, MemoryStore};

pub const TECH_RSS: &str = include_str!("../fixtures/technology_rss.xml");
pub const BUSINESS_RSS: &str = include_str!("../fixtures/business_rss.xml");
pub const EMPTY_RSS: &str = include_str!("../fixtures/empty_rss.xml");

/// Replies with `reply`, except for prompts containing one of `degrade_on`,
/// which come back as an HTTP 500 degradation.
pub struct ScriptedGenerator {
    pub reply: String,
    pub degrade_on: Vec<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            degrade_on: Vec::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn degrading_on(mut self, needle: &str) -> Self {
        self.degrade_on.push(needle.to_string());
        self
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _max_output_tokens: u32) -> Result<Generated> {
        self.prompts.lock().push(prompt.to_string());
        if self.degrade_on.iter().any(|n| prompt.contains(n.as_str())) {
            return Ok(Generated::Degraded(DegradeReason::Status(500)));
        }
        Ok(Generated::Text(self.reply.clone()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Keeps every posted message; optionally fails all posts.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
    pub fail_all: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_all: true,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn post(&self, text: &str) -> Result<()> {
        if self.fail_all {
            anyhow::bail!("webhook unavailable");
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Number of article blocks rendered into `message`.
pub fn block_count(message: &str) -> usize {
    message.matches("📝 *SUMMARY:*").count()
}

pub fn provider(source: Source, category: Category, xml: &str) -> Arc<dyn FeedProvider> {
    Arc::new(RssFeedProvider::from_fixture(source, category, xml))
}

pub fn stored_article(category: Category, url: &str, published_at: DateTime<Utc>) -> Article {
    Article::new(Source::VnExpress, category, "Previously stored", url, published_at, published_at)
}

pub fn limits(per_category: &[(Category, usize)]) -> FetchLimits {
    let mut max_articles = BTreeMap::new();
    for (c, n) in per_category {
        max_articles.insert(c.as_str().to_string(), *n);
    }
    FetchLimits::new(FetchConfig {
        max_articles,
        ..FetchConfig::default()
    })
}

/// Everything a test needs to drive and inspect one orchestrator.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestrator: Arc<Orchestrator>,
}

pub struct HarnessBuilder {
    providers: Vec<Arc<dyn FeedProvider>>,
    store: Arc<MemoryStore>,
    articles: Option<Arc<dyn ArticleRepository>>,
    knowledge: Option<Arc<dyn KnowledgeRepository>>,
    generator: ScriptedGenerator,
    text_generator: Option<Arc<dyn TextGenerator>>,
    notifier: RecordingNotifier,
    limits: FetchLimits,
    categories: Vec<Category>,
    max_chars: usize,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            store: Arc::new(MemoryStore::new()),
            articles: None,
            knowledge: None,
            generator: ScriptedGenerator::new("A concise generated summary of the story."),
            text_generator: None,
            notifier: RecordingNotifier::default(),
            limits: FetchLimits::default(),
            categories: Category::ALL.to_vec(),
            max_chars: 13_000,
        }
    }

    pub fn feed(mut self, source: Source, category: Category, xml: &str) -> Self {
        self.providers.push(provider(source, category, xml));
        self
    }

    pub fn provider(mut self, p: Arc<dyn FeedProvider>) -> Self {
        self.providers.push(p);
        self
    }

    pub fn store(mut self, store: Arc<MemoryStore>) -> Self {
        self.store = store;
        self
    }

    /// Article repository used by the fetch stage and orchestrator instead of the store.
    pub fn articles(mut self, repo: Arc<dyn ArticleRepository>) -> Self {
        self.articles = Some(repo);
        self
    }

    /// Knowledge repository used by enrichment instead of the store.
    pub fn knowledge(mut self, repo: Arc<dyn KnowledgeRepository>) -> Self {
        self.knowledge = Some(repo);
        self
    }

    pub fn generator(mut self, g: ScriptedGenerator) -> Self {
        self.generator = g;
        self
    }

    /// Replaces the scripted generator inside the pipeline; `Harness::generator`
    /// then sees no prompts.
    pub fn text_generator(mut self, g: Arc<dyn TextGenerator>) -> Self {
        self.text_generator = Some(g);
        self
    }

    pub fn notifier(mut self, n: RecordingNotifier) -> Self {
        self.notifier = n;
        self
    }

    pub fn limits(mut self, l: FetchLimits) -> Self {
        self.limits = l;
        self
    }

    pub fn categories(mut self, c: &[Category]) -> Self {
        self.categories = c.to_vec();
        self
    }

    pub fn max_chars(mut self, n: usize) -> Self {
        self.max_chars = n;
        self
    }

    pub fn build(self) -> Harness {
        let generator = Arc::new(self.generator);
        let notifier = Arc::new(self.notifier);
        let articles: Arc<dyn ArticleRepository> = match self.articles {
            Some(a) => a,
            None => self.store.clone(),
        };
        let knowledge: Arc<dyn KnowledgeRepository> = match self.knowledge {
            Some(k) => k,
            None => self.store.clone(),
        };

        let fetch = FetchStage::new(self.providers, articles.clone(), self.limits);
        let gen_dyn: Arc<dyn TextGenerator> = match self.text_generator {
            Some(g) => g,
            None => generator.clone(),
        };
        let summarizer = Summarizer::new(gen_dyn.clone(), SummaryConfig::default(), 1024);
        let enhancer = Enhancer::new(gen_dyn, knowledge.clone(), 2500);
        let enricher = Enricher::new(summarizer, enhancer, articles.clone(), knowledge);
        let delivery = Delivery::new(notifier.clone(), Duration::ZERO);

        let orchestrator = Orchestrator::new(
            fetch,
            enricher,
            delivery,
            DigestBuilder::new(self.max_chars, 5),
            articles,
            PipelineSettings {
                categories: self.categories,
                ranking: RankingConfig::default(),
                enrich_concurrency: 2,
            },
        );

        Harness {
            store: self.store,
            generator,
            notifier,
            orchestrator: Arc::new(orchestrator),
        }
    }
}
