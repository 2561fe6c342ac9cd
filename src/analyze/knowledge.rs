// src/analyze/knowledge.rs
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::model::{Category, KnowledgeEntry};
use crate::store::KnowledgeRepository;

pub const MAX_KEYWORDS: usize = 20;
pub const MAX_RELEVANT: usize = 5;
/// Tokens must be longer than this many characters.
pub const MIN_KEYWORD_LEN_EXCLUSIVE: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "can", "this", "that",
    "these", "those", "i", "you", "he", "she", "it", "we", "they", "what", "which", "who", "when",
    "where", "why", "how", "all", "each", "every", "both", "few", "more", "most", "other", "some",
    "such", "no", "nor", "not", "only", "same", "so", "than", "too", "very", "just",
];

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceCell<HashSet<&'static str>> = OnceCell::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

/// Lowercase, punctuation to spaces, split on whitespace, keep tokens longer
/// than three characters that are not stopwords, first occurrence order, at
/// most twenty.
pub fn extract_keywords(text: &str) -> Vec<String> {
    static RE_PUNCT: OnceCell<Regex> = OnceCell::new();
    let re = RE_PUNCT.get_or_init(|| Regex::new(r"[^\w\s]").unwrap());

    let lowered = text.to_lowercase();
    let cleaned = re.replace_all(&lowered, " ");

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tok in cleaned.split_whitespace() {
        if tok.chars().count() <= MIN_KEYWORD_LEN_EXCLUSIVE || stopwords().contains(tok) {
            continue;
        }
        if seen.insert(tok) {
            out.push(tok.to_string());
            if out.len() == MAX_KEYWORDS {
                break;
            }
        }
    }
    out
}

/// +3 per keyword found in the topic, +1 per keyword found only in the
/// description or tags.
pub fn score_entry(entry: &KnowledgeEntry, keywords: &[String]) -> u32 {
    let topic = entry.topic.to_lowercase();
    let rest = format!("{} {}", entry.description, entry.tags.join(" ")).to_lowercase();
    keywords
        .iter()
        .map(|k| {
            if topic.contains(k.as_str()) {
                3
            } else if rest.contains(k.as_str()) {
                1
            } else {
                0
            }
        })
        .sum()
}

/// Rank `entries` against `summary`. With no usable keywords the first five
/// entries are returned unscored.
pub fn rank_relevant(entries: Vec<KnowledgeEntry>, summary: &str) -> Vec<KnowledgeEntry> {
    if entries.is_empty() {
        return entries;
    }
    let keywords = extract_keywords(summary);
    if keywords.is_empty() {
        return entries.into_iter().take(MAX_RELEVANT).collect();
    }

    let mut scored: Vec<(u32, KnowledgeEntry)> = entries
        .into_iter()
        .map(|e| (score_entry(&e, &keywords), e))
        .filter(|(s, _)| *s > 0)
        .collect();
    scored.sort_by(|(sa, a), (sb, b)| {
        sb.cmp(sa)
            .then_with(|| b.confidence_score.total_cmp(&a.confidence_score))
    });
    scored
        .into_iter()
        .take(MAX_RELEVANT)
        .map(|(_, e)| e)
        .collect()
}

pub struct KnowledgeMatcher {
    repo: Arc<dyn KnowledgeRepository>,
}

impl KnowledgeMatcher {
    pub fn new(repo: Arc<dyn KnowledgeRepository>) -> Self {
        Self { repo }
    }

    pub async fn relevant_knowledge(
        &self,
        summary: &str,
        category: Category,
    ) -> Result<Vec<KnowledgeEntry>> {
        let entries = self.repo.active_knowledge(category).await?;
        let out = rank_relevant(entries, summary);
        tracing::debug!(target: "enhance", %category, matched = out.len(), "knowledge matched");
        Ok(out)
    }
}
