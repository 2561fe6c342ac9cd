// src/store/memory.rs
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::{ArticleRepository, KnowledgeRepository, StoreError, StoreResult};
use crate::model::{
    AnalysisQuestion, AnalysisResult, Article, ArticleId, Category, KnowledgeDispute,
    KnowledgeEntry, KnowledgeId,
};

#[derive(Default)]
struct Inner {
    articles: HashMap<ArticleId, Article>,
    urls: HashSet<String>,
    knowledge: Vec<KnowledgeEntry>,
    questions: Vec<AnalysisQuestion>,
    analyses: HashMap<ArticleId, AnalysisResult>,
    disputes: Vec<KnowledgeDispute>,
}

/// Process-local store implementing both repository contracts.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default, Deserialize)]
struct KnowledgeSeed {
    #[serde(default)]
    knowledge: Vec<KnowledgeEntry>,
    #[serde(default)]
    questions: Vec<AnalysisQuestion>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `[[knowledge]]` and `[[questions]]` tables from a TOML file.
    pub fn seed_from_path(&self, path: &Path) -> Result<(usize, usize)> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading knowledge seed from {}", path.display()))?;
        let seed: KnowledgeSeed = toml::from_str(&content)
            .with_context(|| format!("parsing knowledge seed {}", path.display()))?;
        let counts = (seed.knowledge.len(), seed.questions.len());
        self.seed(seed.knowledge, seed.questions)?;
        Ok(counts)
    }

    pub fn seed(
        &self,
        knowledge: Vec<KnowledgeEntry>,
        questions: Vec<AnalysisQuestion>,
    ) -> StoreResult<()> {
        let mut g = self.write()?;
        g.knowledge.extend(knowledge);
        g.questions.extend(questions);
        Ok(())
    }

    pub fn article_count(&self) -> usize {
        self.read().map(|g| g.articles.len()).unwrap_or(0)
    }

    pub fn article(&self, id: &ArticleId) -> Option<Article> {
        self.read().ok().and_then(|g| g.articles.get(id).cloned())
    }

    pub fn disputes(&self) -> Vec<KnowledgeDispute> {
        self.read().map(|g| g.disputes.clone()).unwrap_or_default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl ArticleRepository for MemoryStore {
    async fn exists_by_url(&self, url: &str) -> StoreResult<bool> {
        Ok(self.read()?.urls.contains(url))
    }

    async fn exists_by_id(&self, id: &ArticleId) -> StoreResult<bool> {
        Ok(self.read()?.articles.contains_key(id))
    }

    async fn add_articles(&self, articles: &[Article]) -> StoreResult<()> {
        let mut g = self.write()?;
        let mut batch_urls = HashSet::with_capacity(articles.len());
        for a in articles {
            if g.urls.contains(&a.url) || !batch_urls.insert(a.url.as_str()) {
                return Err(StoreError::DuplicateUrl(a.url.clone()));
            }
        }
        for a in articles {
            g.urls.insert(a.url.clone());
            g.articles.insert(a.id.clone(), a.clone());
        }
        Ok(())
    }

    async fn update_article(&self, article: &Article) -> StoreResult<()> {
        let mut g = self.write()?;
        match g.articles.get_mut(&article.id) {
            Some(slot) => {
                *slot = article.clone();
                slot.updated_at = Utc::now();
                Ok(())
            }
            None => Err(StoreError::ArticleMissing(article.id.clone())),
        }
    }

    async fn recent_by_category(&self, category: Category, n: usize) -> StoreResult<Vec<Article>> {
        let g = self.read()?;
        let mut out: Vec<Article> = g
            .articles
            .values()
            .filter(|a| a.category == category)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        out.truncate(n);
        Ok(out)
    }
}

#[async_trait]
impl KnowledgeRepository for MemoryStore {
    async fn active_knowledge(&self, category: Category) -> StoreResult<Vec<KnowledgeEntry>> {
        let g = self.read()?;
        let mut out: Vec<KnowledgeEntry> = g
            .knowledge
            .iter()
            .filter(|k| k.is_active && k.category == category)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.confidence_score
                .total_cmp(&a.confidence_score)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        Ok(out)
    }

    async fn active_questions(&self, category: Category) -> StoreResult<Vec<AnalysisQuestion>> {
        let g = self.read()?;
        let mut out: Vec<AnalysisQuestion> = g
            .questions
            .iter()
            .filter(|q| q.is_active && q.category == category)
            .cloned()
            .collect();
        out.sort_by_key(|q| q.priority);
        Ok(out)
    }

    async fn add_analysis(&self, result: AnalysisResult) -> StoreResult<()> {
        let mut g = self.write()?;
        if !g.articles.contains_key(&result.article_id) {
            return Err(StoreError::ArticleMissing(result.article_id));
        }
        if g.analyses.contains_key(&result.article_id) {
            return Err(StoreError::AnalysisExists(result.article_id));
        }
        g.analyses.insert(result.article_id.clone(), result);
        Ok(())
    }

    async fn analysis_for(&self, article: &ArticleId) -> StoreResult<Option<AnalysisResult>> {
        Ok(self.read()?.analyses.get(article).cloned())
    }

    async fn mark_disputed(
        &self,
        knowledge_id: KnowledgeId,
        conflicting_id: KnowledgeId,
        reason: &str,
    ) -> StoreResult<bool> {
        let mut g = self.write()?;
        let known = |id: KnowledgeId| g.knowledge.iter().any(|k| k.id == id);
        if !known(knowledge_id) || !known(conflicting_id) {
            return Ok(false);
        }
        let id = g.disputes.len() as u64 + 1;
        g.disputes.push(KnowledgeDispute {
            id,
            knowledge_id,
            conflicting_id,
            reason: reason.to_string(),
            created_at: Utc::now(),
            resolved_at: None,
            resolution: None,
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Source, ConfidenceTier};
    use chrono::{Duration, TimeZone};

    fn article(url: &str, hour: u32) -> Article {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap();
        Article::new(Source::VnExpress, Category::Business, "t", url, ts, ts)
    }

    fn entry(id: u64, score: f64) -> KnowledgeEntry {
        KnowledgeEntry {
            id,
            category: Category::Business,
            topic: format!("topic {id}"),
            description: String::new(),
            source_url: None,
            confidence_score: score,
            tags: vec![],
            is_active: true,
            updated_at: Utc::now() - Duration::days(id as i64),
        }
    }

    #[tokio::test]
    async fn duplicate_url_rejects_whole_batch() {
        let store = MemoryStore::new();
        store.add_articles(&[article("https://x.test/1", 1)]).await.unwrap();

        let err = store
            .add_articles(&[article("https://x.test/2", 2), article("https://x.test/1", 3)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUrl(u) if u == "https://x.test/1"));
        assert_eq!(store.article_count(), 1);
        assert!(!store.exists_by_url("https://x.test/2").await.unwrap());
    }

    #[tokio::test]
    async fn recent_by_category_is_newest_first() {
        let store = MemoryStore::new();
        store
            .add_articles(&[
                article("https://x.test/a", 1),
                article("https://x.test/b", 5),
                article("https://x.test/c", 3),
            ])
            .await
            .unwrap();
        let recent = store.recent_by_category(Category::Business, 2).await.unwrap();
        let urls: Vec<_> = recent.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.test/b", "https://x.test/c"]);
    }

    #[tokio::test]
    async fn analysis_requires_existing_article() {
        let store = MemoryStore::new();
        let a = article("https://x.test/a", 1);
        let result = AnalysisResult {
            article_id: a.id.clone(),
            category: Category::Business,
            original_summary: "s".into(),
            enhanced_analysis: "e".into(),
            referenced_knowledge: vec![],
            source_urls: vec![],
            confidence: ConfidenceTier::Low,
            questions_answered: "[]".into(),
            created_at: Utc::now(),
        };
        let err = store.add_analysis(result.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::ArticleMissing(_)));

        store.add_articles(&[a.clone()]).await.unwrap();
        store.add_analysis(result.clone()).await.unwrap();
        assert!(matches!(
            store.add_analysis(result).await.unwrap_err(),
            StoreError::AnalysisExists(_)
        ));
        assert!(store.analysis_for(&a.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn knowledge_ordered_by_confidence_and_disputes_need_both_entries() {
        let store = MemoryStore::new();
        store
            .seed(vec![entry(1, 0.5), entry(2, 0.9), entry(3, 0.7)], vec![])
            .unwrap();
        let ids: Vec<_> = store
            .active_knowledge(Category::Business)
            .await
            .unwrap()
            .iter()
            .map(|k| k.id)
            .collect();
        assert_eq!(ids, vec![2, 3, 1]);

        assert!(store.mark_disputed(1, 2, "contradicts").await.unwrap());
        assert!(!store.mark_disputed(1, 42, "unknown").await.unwrap());
        assert_eq!(store.disputes().len(), 1);
    }
}
