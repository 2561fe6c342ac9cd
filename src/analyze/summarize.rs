// src/analyze/summarize.rs
use std::sync::Arc;

use metrics::counter;

use super::gemini::{DegradeReason, Generated, TextGenerator};
use crate::config::SummaryConfig;

pub const TRUNCATION_MARKER: &str = " [...]";

/// Summarizer output. `Fallback` carries the inline placeholder used when the
/// API is unavailable; it is still a valid (non-empty) summary text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Summary {
    Generated(String),
    Fallback(String),
}

impl Summary {
    pub fn text(&self) -> &str {
        match self {
            Summary::Generated(s) | Summary::Fallback(s) => s,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Summary::Generated(s) | Summary::Fallback(s) => s,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Summary::Generated(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    FullArticle,
    HeadlineOnly,
}

pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    cfg: SummaryConfig,
    max_tokens: u32,
}

impl Summarizer {
    pub fn new(generator: Arc<dyn TextGenerator>, cfg: SummaryConfig, max_tokens: u32) -> Self {
        Self {
            generator,
            cfg,
            max_tokens,
        }
    }

    pub fn mode_for(&self, content: Option<&str>) -> PromptMode {
        match content {
            Some(c) if c.trim().chars().count() > self.cfg.substantial_content_chars => {
                PromptMode::FullArticle
            }
            _ => PromptMode::HeadlineOnly,
        }
    }

    /// Never fails: API problems come back as `Summary::Fallback`.
    pub async fn summarize(&self, title: &str, content: Option<&str>) -> Summary {
        let mode = self.mode_for(content);
        let (min_words, max_words) = match mode {
            PromptMode::FullArticle => (self.cfg.full_min_words, self.cfg.full_max_words),
            PromptMode::HeadlineOnly => (self.cfg.headline_min_words, self.cfg.headline_max_words),
        };
        let prompt = build_summary_prompt(mode, title, content.unwrap_or_default(), min_words, max_words);
        tracing::debug!(target: "summarize", ?mode, prompt_len = prompt.len(), "requesting summary");

        let out = match self.generator.generate(&prompt, self.max_tokens).await {
            Ok(Generated::Text(text)) => {
                let words = word_count(&text);
                if words < min_words {
                    tracing::warn!(
                        target: "summarize",
                        words,
                        min_words,
                        title,
                        "summary shorter than requested; accepted"
                    );
                }
                Summary::Generated(truncate_words(&text, max_words))
            }
            Ok(Generated::Degraded(reason)) => {
                tracing::warn!(target: "summarize", ?reason, title, "summary degraded");
                Summary::Fallback(degraded_summary_text(reason))
            }
            Err(e) => {
                tracing::warn!(target: "summarize", error = ?e, title, "summary request failed");
                Summary::Fallback(format!("Error generating summary: {e:#}"))
            }
        };

        let outcome = if out.is_generated() { "generated" } else { "fallback" };
        counter!("digest_summaries_total", "outcome" => outcome).increment(1);
        out
    }
}

pub fn degraded_summary_text(reason: DegradeReason) -> String {
    match reason {
        DegradeReason::MissingCredential => {
            "Unable to generate summary - API key not configured.".to_string()
        }
        DegradeReason::Status(code) => format!("Error generating summary - API returned {code}"),
        DegradeReason::EmptyResponse => {
            "Unable to generate summary - API returned empty response.".to_string()
        }
    }
}

pub fn build_summary_prompt(
    mode: PromptMode,
    title: &str,
    content: &str,
    min_words: usize,
    max_words: usize,
) -> String {
    match mode {
        PromptMode::FullArticle => format!(
            "Please create a detailed summary of the following news article in {min_words}-{max_words} words. \
IMPORTANT - Focus on:\n\
1. **Key Numbers & Statistics** - Extract all specific numbers, percentages, dates, values mentioned\n\
2. **Important Quotes** - Include the most relevant direct quotes from the article\n\
3. **Main Points** - What happened, why it matters, who it affects\n\
4. **Context & Implications** - Background information and potential impact\n\n\
Article Title: {title}\n\n\
Article Content:\n{content}\n\n\
Provide a comprehensive summary with clear sections for numbers/statistics and important quotes."
        ),
        PromptMode::HeadlineOnly => format!(
            "Based on the following news headline, create a brief {min_words}-{max_words} word summary that:\n\
1. **Expands on what the headline suggests**\n\
2. **Provides realistic context** about what might have happened\n\
3. **Highlights key implications** and why this matters\n\
4. **Suggests possible impact** on industry/market/society\n\n\
News Headline: {title}\n\n\
Only the headline is available. Infer the likely context from the headline alone, \
based on current events and industry knowledge, and keep the summary concise but informative."
        ),
    }
}

pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Cut `text` to at most `max_words` words, appending the truncation marker
/// when anything was removed. Line structure of the kept part is preserved.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    if word_count(text) <= max_words {
        return text.to_string();
    }
    let mut seen = 0usize;
    let mut in_word = false;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_word {
                in_word = false;
                if seen == max_words {
                    return format!("{}{}", text[..i].trim_end(), TRUNCATION_MARKER);
                }
            }
        } else if !in_word {
            in_word = true;
            seen += 1;
        }
    }
    text.to_string()
}
