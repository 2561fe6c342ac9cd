// src/store/mod.rs
//! Repository contracts the pipeline persists through.
//!
//! The relational engine is not part of this crate; `memory::MemoryStore` is the
//! in-process implementation used by the service and the tests.

pub mod memory;

use async_trait::async_trait;

use crate::model::{
    AnalysisQuestion, AnalysisResult, Article, ArticleId, Category, KnowledgeEntry, KnowledgeId,
};

pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("an article with url {0} is already stored")]
    DuplicateUrl(String),
    /// Integrity violation: something references an article that was never persisted.
    #[error("article {0} does not exist")]
    ArticleMissing(ArticleId),
    #[error("analysis for article {0} already exists")]
    AnalysisExists(ArticleId),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ArticleRepository: Send + Sync {
    async fn exists_by_url(&self, url: &str) -> StoreResult<bool>;

    async fn exists_by_id(&self, id: &ArticleId) -> StoreResult<bool>;

    /// Persist a batch in one unit of work. The URL uniqueness constraint is
    /// enforced here; a conflicting batch is rejected as a whole.
    async fn add_articles(&self, articles: &[Article]) -> StoreResult<()>;

    /// Replace a stored article. Fails with `ArticleMissing` if it was never added.
    async fn update_article(&self, article: &Article) -> StoreResult<()>;

    /// Most recently published articles of a category, newest first.
    async fn recent_by_category(&self, category: Category, n: usize) -> StoreResult<Vec<Article>>;
}

#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Active entries of a category, highest confidence first, then most recently updated.
    async fn active_knowledge(&self, category: Category) -> StoreResult<Vec<KnowledgeEntry>>;

    /// Active questions of a category, ascending priority number.
    async fn active_questions(&self, category: Category) -> StoreResult<Vec<AnalysisQuestion>>;

    /// Persist an analysis. The referenced article must already exist.
    async fn add_analysis(&self, result: AnalysisResult) -> StoreResult<()>;

    async fn analysis_for(&self, article: &ArticleId) -> StoreResult<Option<AnalysisResult>>;

    /// Record that two entries contradict each other. Returns `false` when
    /// either entry is unknown.
    async fn mark_disputed(
        &self,
        knowledge_id: KnowledgeId,
        conflicting_id: KnowledgeId,
        reason: &str,
    ) -> StoreResult<bool>;
}
