// src/notify/digest.rs
//! Rendering enriched articles into size-bounded chat messages.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::config::NotifyConfig;
use crate::model::{Category, EnrichedArticle};

pub const HEADER_TITLE: &str = "📰 *Daily News Summary* 📰";
pub const CONTINUED_HEADER: &str = "📰 *Daily News Summary (continued)* 📰\n\n";
pub const WRAP_WIDTH: usize = 80;
const MAX_SOURCES_SHOWN: usize = 3;
const BLOCK_TRUNCATED: &str = "\n…(truncated)\n";
/// Smallest ceiling that still leaves room for the headers plus part of one block.
pub const MIN_MESSAGE_CHARS: usize = 1_000;

#[derive(Debug, Clone)]
pub struct DigestBuilder {
    max_chars: usize,
    per_category_cap: usize,
}

impl DigestBuilder {
    /// `max_chars` below [`MIN_MESSAGE_CHARS`] is raised to it.
    pub fn new(max_chars: usize, per_category_cap: usize) -> Self {
        if max_chars < MIN_MESSAGE_CHARS {
            tracing::warn!(target: "notify", max_chars, min = MIN_MESSAGE_CHARS, "message ceiling too small; raised");
        }
        Self {
            max_chars: max_chars.max(MIN_MESSAGE_CHARS),
            per_category_cap: per_category_cap.max(1),
        }
    }

    pub fn from_config(cfg: &NotifyConfig) -> Self {
        Self::new(cfg.max_message_chars, cfg.per_category_cap)
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn per_category_cap(&self) -> usize {
        self.per_category_cap
    }

    /// Group by category (newest first, capped per category) and render into
    /// one or more messages of at most `max_chars` characters each.
    pub fn build_messages(&self, items: &[EnrichedArticle], generated_at: DateTime<Utc>) -> Vec<String> {
        let groups = self.group(items);
        if groups.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut msg = Message::new(self.render_header(&groups, generated_at));

        for (category, entries) in &groups {
            let heading = format!(
                "*{}* ({} articles)\n{}\n\n",
                category,
                entries.len(),
                "═".repeat(30)
            );
            let carried = format!("*{category}* (continued)\n{}\n\n", "═".repeat(30));
            let mut heading_pending = true;

            for (i, item) in entries.iter().enumerate() {
                let block = render_block(i + 1, item);
                let prefix = if heading_pending { heading.as_str() } else { "" };

                if msg.has_blocks && msg.len + char_len(prefix) + char_len(&block) > self.max_chars {
                    out.push(std::mem::replace(&mut msg, Message::new(CONTINUED_HEADER.to_string())).text);
                    if !heading_pending {
                        msg.push(&carried);
                    }
                }

                msg.push(prefix);
                let room = self.max_chars.saturating_sub(msg.len);
                if char_len(&block) > room {
                    msg.push(&truncate_block(&block, room));
                } else {
                    msg.push(&block);
                }
                msg.has_blocks = true;
                heading_pending = false;
            }
        }

        if msg.has_blocks {
            out.push(msg.text);
        }
        out
    }

    fn group<'a>(&self, items: &'a [EnrichedArticle]) -> BTreeMap<Category, Vec<&'a EnrichedArticle>> {
        let mut groups: BTreeMap<Category, Vec<&EnrichedArticle>> = BTreeMap::new();
        for it in items {
            groups.entry(it.article.category).or_default().push(it);
        }
        for v in groups.values_mut() {
            v.sort_by(|a, b| b.article.published_at.cmp(&a.article.published_at));
            v.truncate(self.per_category_cap);
        }
        groups
    }

    fn render_header(
        &self,
        groups: &BTreeMap<Category, Vec<&EnrichedArticle>>,
        generated_at: DateTime<Utc>,
    ) -> String {
        let total: usize = groups.values().map(Vec::len).sum();
        let breakdown = groups
            .iter()
            .map(|(c, v)| format!("{c}: {}", v.len()))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{HEADER_TITLE}\n_Generated at {} UTC_\n✅ *Total: {total} articles ({breakdown})*\n\n",
            generated_at.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

struct Message {
    text: String,
    len: usize,
    has_blocks: bool,
}

impl Message {
    fn new(text: String) -> Self {
        let len = char_len(&text);
        Self {
            text,
            len,
            has_blocks: false,
        }
    }

    fn push(&mut self, s: &str) {
        self.text.push_str(s);
        self.len += char_len(s);
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Cut `block` to at most `room` characters, ending with a marker when it fits.
fn truncate_block(block: &str, room: usize) -> String {
    let marker_len = char_len(BLOCK_TRUNCATED);
    if room <= marker_len {
        return block.chars().take(room).collect();
    }
    let mut out: String = block.chars().take(room - marker_len).collect();
    out.push_str(BLOCK_TRUNCATED);
    out
}

/// Escape the three characters Slack mrkdwn treats as control sequences.
pub fn escape_mrkdwn(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn render_block(index: usize, item: &EnrichedArticle) -> String {
    let a = &item.article;
    let mut b = String::new();
    let _ = writeln!(b, "*{index}. <{}|{}>*", a.url, escape_mrkdwn(&a.title).replace('|', "¦"));
    let _ = writeln!(
        b,
        "  _Source: {} | Published: {}Z_",
        a.source,
        a.published_at.format("%Y-%m-%d %H:%M")
    );
    b.push('\n');
    b.push_str("📝 *SUMMARY:*\n");
    b.push_str(escape_mrkdwn(a.summary.trim()).as_str());
    b.push_str("\n\n");

    if let Some(analysis) = &item.analysis {
        b.push_str("💡 *ANALYSIS INSIGHTS:*\n");
        for line in wrap_text(&escape_mrkdwn(&analysis.enhanced_analysis), WRAP_WIDTH - 2) {
            if line.is_empty() {
                b.push('\n');
            } else {
                let _ = writeln!(b, "  {line}");
            }
        }
        b.push('\n');
        let _ = writeln!(
            b,
            "  *Confidence Level:* {} {}",
            analysis.confidence.emoji(),
            analysis.confidence
        );
        if !analysis.source_urls.is_empty() {
            b.push_str("📚 *KEY SOURCES:*\n");
            for (i, url) in analysis.source_urls.iter().take(MAX_SOURCES_SHOWN).enumerate() {
                let _ = writeln!(b, "  • <{url}|Source {}>", i + 1);
            }
            if analysis.source_urls.len() > MAX_SOURCES_SHOWN {
                let _ = writeln!(
                    b,
                    "  ... and {} more sources",
                    analysis.source_urls.len() - MAX_SOURCES_SHOWN
                );
            }
        }
        b.push('\n');
    }
    b.push_str(&"─".repeat(40));
    b.push_str("\n\n");
    b
}

/// Greedy word wrap per input line; blank input lines are kept. Words longer
/// than `width` stand on their own line.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    for raw in text.lines() {
        let mut line = String::new();
        let mut line_len = 0usize;
        let mut any = false;
        for word in raw.split_whitespace() {
            any = true;
            let wl = char_len(word);
            if line_len > 0 && line_len + 1 + wl > width {
                out.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line.push_str(word);
            line_len += wl;
        }
        if any {
            out.push(line);
        } else {
            out.push(String::new());
        }
    }
    out
}
