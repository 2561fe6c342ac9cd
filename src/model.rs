// src/model.rs
//! Core records flowing through the digest pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// News category. Parsed case-insensitively from config and request paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Business,
    Technology,
    World,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Business, Category::Technology, Category::World];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Business => "Business",
            Category::Technology => "Technology",
            Category::World => "World",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category `{0}` (valid: Business, Technology, World)")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(t))
            .ok_or_else(|| UnknownCategory(t.to_string()))
    }
}

/// Feed publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Reuters,
    #[serde(rename = "VNExpress", alias = "VnExpress")]
    VnExpress,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Reuters => "Reuters",
            Source::VnExpress => "VNExpress",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque article identity: a short SHA-256 digest of the canonical URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(String);

impl ArticleId {
    pub fn from_url(url: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(24);
        for b in digest.iter().take(12) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub url: String,
    pub content: Option<String>,
    /// Empty until the summarize step has run.
    pub summary: String,
    pub source: Source,
    pub category: Category,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn new(
        source: Source,
        category: Category,
        title: impl Into<String>,
        url: impl Into<String>,
        published_at: DateTime<Utc>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let url = url.into();
        Self {
            id: ArticleId::from_url(&url),
            title: title.into(),
            url,
            content: None,
            summary: String::new(),
            source,
            category,
            published_at,
            fetched_at,
            delivered_at: None,
            created_at: fetched_at,
            updated_at: fetched_at,
        }
    }

    pub fn has_summary(&self) -> bool {
        !self.summary.trim().is_empty()
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }
}

/// HIGH / MEDIUM / LOW bucket over a [0,1] confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceTier::High
        } else if score >= 0.6 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "HIGH",
            ConfidenceTier::Medium => "MEDIUM",
            ConfidenceTier::Low => "LOW",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "✅",
            ConfidenceTier::Medium => "⚠️",
            ConfidenceTier::Low => "❌",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type KnowledgeId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: KnowledgeId,
    pub category: Category,
    pub topic: String,
    pub description: String,
    #[serde(default)]
    pub source_url: Option<String>,
    pub confidence_score: f64,
    /// Hierarchical tags such as `economy/inflation`.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    pub fn confidence(&self) -> ConfidenceTier {
        ConfidenceTier::from_score(self.confidence_score)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisQuestion {
    pub id: u64,
    pub category: Category,
    pub question: String,
    #[serde(default)]
    pub purpose: Option<String>,
    /// 1 = high, 2 = medium, 3 = low.
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Knowledge-grounded analysis of one article. Created once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub article_id: ArticleId,
    pub category: Category,
    pub original_summary: String,
    pub enhanced_analysis: String,
    pub referenced_knowledge: Vec<KnowledgeId>,
    pub source_urls: Vec<String>,
    pub confidence: ConfidenceTier,
    /// JSON array of `{question, purpose}` pairs.
    pub questions_answered: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDispute {
    pub id: u64,
    pub knowledge_id: KnowledgeId,
    pub conflicting_id: KnowledgeId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

/// An article together with its analysis, as handed to ranking and delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedArticle {
    pub article: Article,
    pub analysis: Option<AnalysisResult>,
}

impl EnrichedArticle {
    pub fn plain(article: Article) -> Self {
        Self {
            article,
            analysis: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_priority() -> u8 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("technology".parse::<Category>().unwrap(), Category::Technology);
        assert_eq!(" WORLD ".parse::<Category>().unwrap(), Category::World);
        let err = "sports".parse::<Category>().unwrap_err();
        assert!(err.to_string().contains("Business, Technology, World"));
    }

    #[test]
    fn confidence_tier_boundaries() {
        assert_eq!(ConfidenceTier::from_score(0.8), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(0.79), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.6), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.59), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_score(0.0), ConfidenceTier::Low);
    }

    #[test]
    fn article_id_is_stable_per_url() {
        let a = ArticleId::from_url("https://example.test/a");
        let b = ArticleId::from_url("https://example.test/a");
        let c = ArticleId::from_url("https://example.test/b");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 24);
    }
}
