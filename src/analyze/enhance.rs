// src/analyze/enhance.rs
//! Knowledge-grounded analysis: prompt assembly, generation, result assembly
//! and persistence.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use serde::Serialize;

use super::gemini::{DegradeReason, Generated, TextGenerator};
use super::knowledge::KnowledgeMatcher;
use crate::model::{AnalysisQuestion, AnalysisResult, Article, ConfidenceTier, KnowledgeEntry};
use crate::store::{KnowledgeRepository, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis {
    Generated(String),
    Fallback(String),
}

impl Analysis {
    pub fn text(&self) -> &str {
        match self {
            Analysis::Generated(s) | Analysis::Fallback(s) => s,
        }
    }
}

pub fn degraded_analysis_text(reason: DegradeReason) -> String {
    match reason {
        DegradeReason::MissingCredential => {
            "Unable to generate enhanced analysis - API key not configured.".to_string()
        }
        DegradeReason::Status(code) => {
            format!("Error generating enhanced analysis - API returned {code}")
        }
        DegradeReason::EmptyResponse => {
            "Unable to generate enhanced analysis - API returned empty response.".to_string()
        }
    }
}

/// Deterministic analysis prompt. Questions are emitted in ascending priority
/// number; equal priorities keep their input order.
pub fn build_prompt(
    summary: &str,
    knowledge: &[KnowledgeEntry],
    questions: &[AnalysisQuestion],
) -> String {
    let mut p = String::with_capacity(2048 + summary.len());
    p.push_str("You are a fact-checking analyst with access to an internal knowledge base.\n");
    p.push_str("Your role is to provide perspective-based analysis grounded in facts and sources.\n\n");

    p.push_str("ARTICLE SUMMARY:\n");
    p.push_str(summary.trim());
    p.push_str("\n\n");

    if !knowledge.is_empty() {
        p.push_str("INTERNAL KNOWLEDGE BASE (References):\n");
        for (i, k) in knowledge.iter().enumerate() {
            let _ = writeln!(p, "{}. • Topic: {}", i + 1, k.topic);
            let _ = writeln!(p, "  Description: {}", k.description);
            if let Some(url) = k.source_url.as_deref().filter(|u| !u.is_empty()) {
                let _ = writeln!(p, "  Source: {url}");
            }
            let _ = writeln!(p, "  Confidence: {}", k.confidence());
        }
        p.push('\n');
    }

    let mut ordered: Vec<&AnalysisQuestion> = questions.iter().collect();
    ordered.sort_by_key(|q| q.priority);
    if !ordered.is_empty() {
        p.push_str("USER QUESTIONS TO ADDRESS:\n");
        for q in &ordered {
            let _ = writeln!(p, "• {}", q.question);
            if let Some(purpose) = q.purpose.as_deref().filter(|s| !s.is_empty()) {
                let _ = writeln!(p, "  (Context: {purpose})");
            }
        }
        p.push('\n');
    }

    p.push_str(
        "TASK:\n\
1. Analyze the article summary against the internal knowledge base\n\
2. Identify facts that are confirmed, contradicted, or not covered by the references\n\
3. Provide perspective-based insights on significance and likely impact\n\
4. Answer each user question using the references where possible\n\
5. Flag any claims that need further verification\n\n\
CRITICAL REQUIREMENTS:\n\
- ALWAYS reference sources when making claims (cite the URLs above)\n\
- NEVER fabricate facts, numbers, or sources\n\
- Mark the confidence of every finding as HIGH, MEDIUM, or LOW\n\
- Format: clear sections with concise bullet points\n\n\
OUTPUT FORMAT:\n\
## Analysis Insights\n\
[Perspective-based analysis]\n\n\
## Key Findings\n\
- [Finding] (Confidence: HIGH/MEDIUM/LOW)\n\n",
    );
    if !ordered.is_empty() {
        p.push_str("## Questions Addressed\n");
        for q in &ordered {
            let _ = writeln!(p, "- Q: {}", q.question);
            p.push_str("  A: [answer] (Confidence: HIGH/MEDIUM/LOW)\n");
        }
        p.push('\n');
    }
    p.push_str("## Source References\n[All URLs cited]\n");
    p
}

/// Tier of the mean confidence score; an empty set averages to 0 (LOW).
pub fn confidence_for(knowledge: &[KnowledgeEntry]) -> ConfidenceTier {
    if knowledge.is_empty() {
        return ConfidenceTier::from_score(0.0);
    }
    let avg = knowledge.iter().map(|k| k.confidence_score).sum::<f64>() / knowledge.len() as f64;
    ConfidenceTier::from_score(avg)
}

#[derive(Serialize)]
struct QuestionRecord<'a> {
    question: &'a str,
    purpose: Option<&'a str>,
}

/// Build the analysis record for `article` from the generated text and the
/// exact knowledge/questions the prompt was built from.
pub fn assemble_result(
    article: &Article,
    enhanced_analysis: String,
    knowledge: &[KnowledgeEntry],
    questions: &[AnalysisQuestion],
) -> AnalysisResult {
    let mut source_urls: Vec<String> = Vec::new();
    for url in knowledge
        .iter()
        .filter_map(|k| k.source_url.as_deref())
        .map(str::trim)
        .filter(|u| !u.is_empty())
    {
        if !source_urls.iter().any(|s| s == url) {
            source_urls.push(url.to_string());
        }
    }

    let records: Vec<QuestionRecord<'_>> = questions
        .iter()
        .map(|q| QuestionRecord {
            question: &q.question,
            purpose: q.purpose.as_deref(),
        })
        .collect();
    let questions_answered = serde_json::to_string(&records).unwrap_or_else(|_| "[]".into());

    AnalysisResult {
        article_id: article.id.clone(),
        category: article.category,
        original_summary: article.summary.clone(),
        enhanced_analysis,
        referenced_knowledge: knowledge.iter().map(|k| k.id).collect(),
        source_urls,
        confidence: confidence_for(knowledge),
        questions_answered,
        created_at: Utc::now(),
    }
}

pub struct Enhancer {
    generator: Arc<dyn TextGenerator>,
    matcher: KnowledgeMatcher,
    repo: Arc<dyn KnowledgeRepository>,
    max_tokens: u32,
}

impl Enhancer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        repo: Arc<dyn KnowledgeRepository>,
        max_tokens: u32,
    ) -> Self {
        Self {
            generator,
            matcher: KnowledgeMatcher::new(repo.clone()),
            repo,
            max_tokens,
        }
    }

    /// Never fails: API problems come back as `Analysis::Fallback`.
    pub async fn generate_analysis(&self, prompt: &str) -> Analysis {
        match self.generator.generate(prompt, self.max_tokens).await {
            Ok(Generated::Text(t)) => Analysis::Generated(t),
            Ok(Generated::Degraded(reason)) => Analysis::Fallback(degraded_analysis_text(reason)),
            Err(e) => Analysis::Fallback(format!("Error generating enhanced analysis: {e:#}")),
        }
    }

    /// Prompt, generate and assemble. A degraded generation still yields a
    /// result; its analysis text is the placeholder.
    pub async fn generate_enhanced_analysis(
        &self,
        article: &Article,
        knowledge: &[KnowledgeEntry],
        questions: &[AnalysisQuestion],
    ) -> (AnalysisResult, bool) {
        let prompt = build_prompt(&article.summary, knowledge, questions);
        tracing::debug!(
            target: "enhance",
            article = %article.id,
            prompt_len = prompt.len(),
            knowledge = knowledge.len(),
            questions = questions.len(),
            "requesting analysis"
        );
        match self.generate_analysis(&prompt).await {
            Analysis::Generated(text) => (assemble_result(article, text, knowledge, questions), true),
            Analysis::Fallback(text) => {
                tracing::warn!(target: "enhance", article = %article.id, reason = %text, "analysis degraded");
                (assemble_result(article, text, knowledge, questions), false)
            }
        }
    }

    /// Best-effort enhancement of a summarized article.
    ///
    /// Lookup problems are logged and yield `Ok(None)`. A degraded generation
    /// is persisted with its placeholder text. Only a failure to persist the
    /// result is returned, since it means the article was never stored.
    pub async fn enhance(&self, article: &Article) -> Result<Option<AnalysisResult>, StoreError> {
        let knowledge = match self
            .matcher
            .relevant_knowledge(&article.summary, article.category)
            .await
        {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(target: "enhance", error = ?e, article = %article.id, "knowledge lookup failed");
                counter!("digest_analyses_total", "outcome" => "error").increment(1);
                return Ok(None);
            }
        };
        if knowledge.is_empty() {
            tracing::debug!(target: "enhance", article = %article.id, "no relevant knowledge; skipping");
            counter!("digest_analyses_total", "outcome" => "skipped").increment(1);
            return Ok(None);
        }

        let questions = match self.repo.active_questions(article.category).await {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!(target: "enhance", error = %e, "question lookup failed; continuing without");
                Vec::new()
            }
        };

        let (result, generated) = self
            .generate_enhanced_analysis(article, &knowledge, &questions)
            .await;

        self.repo.add_analysis(result.clone()).await?;
        let outcome = if generated { "saved" } else { "degraded" };
        counter!("digest_analyses_total", "outcome" => outcome).increment(1);
        tracing::info!(
            target: "enhance",
            article = %article.id,
            confidence = %result.confidence,
            sources = result.source_urls.len(),
            "analysis saved"
        );
        Ok(Some(result))
    }
}
