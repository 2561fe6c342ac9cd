//! Per-run accounting: category counters, status, and the rendered summary table.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::Category;

pub const MSG_NO_ARTICLES: &str = "Unable to fetch articles and no cache available";
pub const MSG_USED_CACHE: &str = "Fetch failed, using cached articles from previous aggregation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum CategoryStatus {
    Success,
    Partial(String),
    Failed(String),
}

impl CategoryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CategoryStatus::Success => "success",
            CategoryStatus::Partial(_) => "partial",
            CategoryStatus::Failed(_) => "failed",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            CategoryStatus::Success => None,
            CategoryStatus::Partial(m) | CategoryStatus::Failed(m) => Some(m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryReport {
    pub category: Category,
    pub fetched: usize,
    pub summarized: usize,
    pub selected: usize,
    pub delivered: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub used_cache: bool,
    pub status: CategoryStatus,
    /// Non-fatal problems worth surfacing (integrity errors, cancelled run, ...).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl CategoryReport {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            fetched: 0,
            summarized: 0,
            selected: 0,
            delivered: 0,
            failed: 0,
            duration_ms: 0,
            used_cache: false,
            status: CategoryStatus::Success,
            notes: Vec::new(),
        }
    }

    /// Category with nothing to work on.
    pub fn failed(category: Category, message: impl Into<String>) -> Self {
        let mut r = Self::new(category);
        r.status = CategoryStatus::Failed(message.into());
        r
    }

    pub fn processed_anything(&self) -> bool {
        self.summarized + self.failed > 0 || self.selected > 0
    }

    /// Derive the status from counters once the category is done.
    ///
    /// `delivery_ok` is `None` when nothing was handed to the notifier.
    pub fn settle(&mut self, delivery_ok: Option<bool>) {
        if matches!(self.status, CategoryStatus::Failed(_)) {
            return;
        }
        if !self.processed_anything() {
            self.status = CategoryStatus::Failed(MSG_NO_ARTICLES.to_string());
            return;
        }
        if self.used_cache {
            self.status = CategoryStatus::Partial(MSG_USED_CACHE.to_string());
        } else if delivery_ok == Some(false) {
            self.status = CategoryStatus::Partial("Digest delivery failed".to_string());
        } else if self.failed > 0 {
            self.status = CategoryStatus::Partial(format!("{} article(s) failed enrichment", self.failed));
        } else if let Some(note) = self.notes.first() {
            self.status = CategoryStatus::Partial(note.clone());
        } else {
            self.status = CategoryStatus::Success;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Partial,
    Failure,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Partial => "partial",
            RunOutcome::Failure => "failure",
        }
    }

    /// Process exit code for one-shot runs.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Success | RunOutcome::Partial => 0,
            RunOutcome::Failure => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub categories: Vec<CategoryReport>,
    pub messages_sent: usize,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn new(executed_at: DateTime<Utc>, categories: Vec<CategoryReport>, messages_sent: usize, duration_ms: u64) -> Self {
        let outcome = outcome_for(&categories);
        Self {
            run_id: format!("run-{}", executed_at.format("%Y%m%dT%H%M%S%.3fZ")),
            executed_at,
            duration_ms,
            categories,
            messages_sent,
            outcome,
        }
    }

    pub fn category(&self, category: Category) -> Option<&CategoryReport> {
        self.categories.iter().find(|c| c.category == category)
    }

    pub fn totals(&self) -> Totals {
        self.categories.iter().fold(Totals::default(), |mut t, c| {
            t.fetched += c.fetched;
            t.summarized += c.summarized;
            t.selected += c.selected;
            t.delivered += c.delivered;
            t.failed += c.failed;
            t
        })
    }

    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Run {} at {} ({}, {} ms, {} message(s))",
            self.run_id,
            self.executed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.outcome.as_str(),
            self.duration_ms,
            self.messages_sent
        );
        let _ = writeln!(
            out,
            "{:<12} {:>7} {:>10} {:>8} {:>9} {:>6} {:>8}  {}",
            "category", "fetched", "summarized", "selected", "delivered", "failed", "ms", "status"
        );
        for c in &self.categories {
            let status = match c.status.message() {
                Some(m) => format!("{}: {}", c.status.label(), m),
                None => c.status.label().to_string(),
            };
            let _ = writeln!(
                out,
                "{:<12} {:>7} {:>10} {:>8} {:>9} {:>6} {:>8}  {}",
                c.category.as_str(),
                c.fetched,
                c.summarized,
                c.selected,
                c.delivered,
                c.failed,
                c.duration_ms,
                status
            );
        }
        let t = self.totals();
        let _ = writeln!(
            out,
            "{:<12} {:>7} {:>10} {:>8} {:>9} {:>6} {:>8}",
            "total", t.fetched, t.summarized, t.selected, t.delivered, t.failed, self.duration_ms
        );
        out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub fetched: usize,
    pub summarized: usize,
    pub selected: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Success only if every category succeeded; partial if anything got processed.
pub fn outcome_for(categories: &[CategoryReport]) -> RunOutcome {
    if !categories.is_empty() && categories.iter().all(|c| c.status == CategoryStatus::Success) {
        RunOutcome::Success
    } else if categories.iter().any(|c| c.processed_anything()) {
        RunOutcome::Partial
    } else {
        RunOutcome::Failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(category: Category, summarized: usize, failed: usize) -> CategoryReport {
        let mut r = CategoryReport::new(category);
        r.fetched = summarized + failed;
        r.summarized = summarized;
        r.failed = failed;
        r.selected = summarized + failed;
        r.settle(Some(true));
        r
    }

    #[test]
    fn empty_category_fails_with_cache_message() {
        let mut r = CategoryReport::new(Category::World);
        r.settle(None);
        assert_eq!(r.status, CategoryStatus::Failed(MSG_NO_ARTICLES.into()));
    }

    #[test]
    fn cache_use_is_partial() {
        let mut r = CategoryReport::new(Category::World);
        r.used_cache = true;
        r.summarized = 2;
        r.selected = 2;
        r.settle(Some(true));
        assert_eq!(r.status, CategoryStatus::Partial(MSG_USED_CACHE.into()));
    }

    #[test]
    fn run_outcome_levels() {
        let ok = done(Category::Business, 3, 0);
        let bad = CategoryReport::failed(Category::World, MSG_NO_ARTICLES);
        assert_eq!(outcome_for(&[ok.clone()]), RunOutcome::Success);
        assert_eq!(outcome_for(&[ok.clone(), bad.clone()]), RunOutcome::Partial);
        assert_eq!(outcome_for(&[bad.clone()]), RunOutcome::Failure);
        assert_eq!(outcome_for(&[]), RunOutcome::Failure);
        assert_eq!(RunOutcome::Failure.exit_code(), 1);
        assert_eq!(RunOutcome::Partial.exit_code(), 0);
    }

    #[test]
    fn table_lists_every_category_and_totals() {
        let report = RunReport::new(
            Utc::now(),
            vec![done(Category::Business, 3, 1), CategoryReport::failed(Category::World, MSG_NO_ARTICLES)],
            1,
            42,
        );
        let table = report.render_table();
        assert!(table.contains("Business"));
        assert!(table.contains(MSG_NO_ARTICLES));
        assert!(table.lines().last().unwrap().starts_with("total"));
        assert_eq!(report.totals().failed, 1);
    }
}
