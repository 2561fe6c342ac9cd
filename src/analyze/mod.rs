// src/analyze/mod.rs
//! Two-phase AI enrichment: summarize, then (best-effort) knowledge-grounded analysis.

pub mod enhance;
pub mod gemini;
pub mod knowledge;
pub mod summarize;

use std::sync::Arc;

use chrono::Utc;

use crate::ingest::content::ContentFetcher;
use crate::model::{Article, EnrichedArticle};
use crate::store::{ArticleRepository, KnowledgeRepository};
use enhance::Enhancer;
use summarize::Summarizer;

/// Outcome of enriching one article. The article is always handed back, even
/// when `error` is set.
#[derive(Debug)]
pub struct Enrichment {
    pub item: EnrichedArticle,
    /// `false` when the summary is an inline placeholder.
    pub summary_generated: bool,
    /// Integrity violation raised while persisting the analysis.
    pub error: Option<anyhow::Error>,
}

impl Enrichment {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Enricher {
    summarizer: Summarizer,
    enhancer: Enhancer,
    articles: Arc<dyn ArticleRepository>,
    knowledge: Arc<dyn KnowledgeRepository>,
    content: Option<ContentFetcher>,
    substantial_content_chars: usize,
}

impl Enricher {
    pub fn new(
        summarizer: Summarizer,
        enhancer: Enhancer,
        articles: Arc<dyn ArticleRepository>,
        knowledge: Arc<dyn KnowledgeRepository>,
    ) -> Self {
        Self {
            summarizer,
            enhancer,
            articles,
            knowledge,
            content: None,
            substantial_content_chars: 100,
        }
    }

    /// Fetch full page text for articles whose feed description is shorter
    /// than `substantial_content_chars`.
    pub fn with_content_fetcher(mut self, fetcher: ContentFetcher, substantial_content_chars: usize) -> Self {
        self.content = Some(fetcher);
        self.substantial_content_chars = substantial_content_chars;
        self
    }

    /// Summarize (unless a summary already exists) and then try to enhance.
    ///
    /// Summary and enhancement problems degrade in place. An integrity
    /// violation while persisting the analysis is reported in
    /// [`Enrichment::error`] next to the summarized article.
    pub async fn enrich(&self, mut article: Article) -> Enrichment {
        if article.has_summary() {
            let analysis = match self.knowledge.analysis_for(&article.id).await {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!(target: "summarize", error = %e, article = %article.id, "analysis lookup failed");
                    None
                }
            };
            return Enrichment {
                item: EnrichedArticle { article, analysis },
                summary_generated: true,
                error: None,
            };
        }

        self.maybe_fetch_content(&mut article).await;

        let summary = self
            .summarizer
            .summarize(&article.title, article.content.as_deref())
            .await;
        let summary_generated = summary.is_generated();
        article.summary = summary.into_text();
        article.updated_at = Utc::now();

        if let Err(e) = self.articles.update_article(&article).await {
            tracing::warn!(target: "summarize", error = %e, article = %article.id, "saving summary failed");
        }

        let (analysis, error) = match self.enhancer.enhance(&article).await {
            Ok(a) => (a, None),
            Err(e) => (
                None,
                Some(anyhow::Error::new(e).context(format!("persisting analysis for article {}", article.id))),
            ),
        };

        Enrichment {
            item: EnrichedArticle { article, analysis },
            summary_generated,
            error,
        }
    }

    async fn maybe_fetch_content(&self, article: &mut Article) {
        let Some(fetcher) = &self.content else {
            return;
        };
        let current = article
            .content
            .as_deref()
            .map(|c| c.chars().count())
            .unwrap_or(0);
        if current > self.substantial_content_chars {
            return;
        }
        if let Some(text) = fetcher.fetch(&article.url).await {
            if text.chars().count() > current {
                article.content = Some(text);
            }
        }
    }
}
