// src/config.rs
//! Service configuration loaded from TOML.
//!
//! Lookup order:
//! 1) `$DIGEST_CONFIG_PATH` (must exist)
//! 2) `config/digest.toml`
//! 3) built-in defaults
//!
//! Secrets given as the literal `"ENV"` are resolved from the process
//! environment (`GEMINI_API_KEY`, `SLACK_WEBHOOK_URL`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Category, Source};
use crate::retry::RetryPolicy;

pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/digest.toml";
pub const ENV_GEMINI_KEY: &str = "GEMINI_API_KEY";
pub const ENV_SLACK_WEBHOOK: &str = "SLACK_WEBHOOK_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub schedule: ScheduleConfig,
    pub pipeline: PipelineConfig,
    pub ranking: RankingConfig,
    pub fetch: FetchConfig,
    pub feeds: Vec<FeedConfig>,
    pub ai: AiConfig,
    pub summary: SummaryConfig,
    pub notify: NotifyConfig,
    pub knowledge: KnowledgeConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local wall-clock time, `HH:MM` or `HH:MM:SS`.
    pub fire_time: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            fire_time: "18:00".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub categories: Vec<String>,
    pub enrich_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            categories: Category::ALL.iter().map(|c| c.to_string()).collect(),
            enrich_concurrency: 2,
        }
    }
}

impl PipelineConfig {
    /// Configured categories; unknown names are logged and skipped.
    pub fn parsed_categories(&self) -> Vec<Category> {
        let mut out = Vec::new();
        for raw in &self.categories {
            match raw.parse::<Category>() {
                Ok(c) if !out.contains(&c) => out.push(c),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "skipping configured category"),
            }
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub default_top_n: usize,
    pub top_n: BTreeMap<String, usize>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            default_top_n: 5,
            top_n: BTreeMap::new(),
        }
    }
}

impl RankingConfig {
    pub fn top_n_for(&self, category: Category) -> usize {
        lookup_for_category(&self.top_n, category).unwrap_or(self.default_top_n)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_articles_default: usize,
    pub max_articles: BTreeMap<String, usize>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub fetch_full_content: bool,
    pub content_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_articles_default: 5,
            max_articles: BTreeMap::new(),
            timeout_secs: 15,
            max_attempts: 3,
            base_delay_ms: 1_000,
            fetch_full_content: true,
            content_timeout_secs: 10,
            user_agent: "Mozilla/5.0 (compatible; news-digest/0.1)".into(),
        }
    }
}

impl FetchConfig {
    pub fn max_articles_for(&self, category: Category) -> usize {
        lookup_for_category(&self.max_articles, category).unwrap_or(self.max_articles_default)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub source: Source,
    pub category: Category,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub model: String,
    /// Use `"ENV"` to read `GEMINI_API_KEY`.
    pub api_key: String,
    pub api_base: String,
    pub summary_max_tokens: u32,
    pub analysis_max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".into(),
            api_key: "ENV".into(),
            api_base: "https://generativelanguage.googleapis.com".into(),
            summary_max_tokens: 1024,
            analysis_max_tokens: 2500,
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub full_min_words: usize,
    pub full_max_words: usize,
    pub headline_min_words: usize,
    pub headline_max_words: usize,
    /// Content longer than this (in chars) selects the full-article prompt.
    pub substantial_content_chars: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            full_min_words: 400,
            full_max_words: 800,
            headline_min_words: 150,
            headline_max_words: 300,
            substantial_content_chars: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Use `"ENV"` to read `SLACK_WEBHOOK_URL`. Empty disables delivery.
    pub webhook_url: String,
    pub max_message_chars: usize,
    pub pacing_ms: u64,
    pub per_category_cap: usize,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: "ENV".into(),
            max_message_chars: 13_000,
            pacing_ms: 200,
            per_category_cap: 5,
            timeout_secs: 10,
            max_attempts: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub seed_path: Option<PathBuf>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            seed_path: Some(PathBuf::from("config/knowledge.toml")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
        }
    }
}

fn lookup_for_category(map: &BTreeMap<String, usize>, category: Category) -> Option<usize> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(category.as_str()))
        .map(|(_, v)| *v)
}

fn resolve_env_secret(value: &str, env_key: &str) -> String {
    if value.trim() == "ENV" {
        std::env::var(env_key).unwrap_or_default().trim().to_string()
    } else {
        value.trim().to_string()
    }
}

impl DigestConfig {
    /// Parse TOML text, then sanitize. Secrets are left unresolved.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: DigestConfig = toml::from_str(s).context("parsing digest config toml")?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading digest config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        tracing::warn!(path = DEFAULT_CONFIG_PATH, "config file not found, using defaults");
        let mut cfg = Self::default();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Replace `"ENV"` placeholders with values from the environment.
    pub fn resolve_secrets(&mut self) {
        self.ai.api_key = resolve_env_secret(&self.ai.api_key, ENV_GEMINI_KEY);
        self.notify.webhook_url = resolve_env_secret(&self.notify.webhook_url, ENV_SLACK_WEBHOOK);
        if self.ai.api_key.is_empty() {
            tracing::warn!("no generative API key configured; summaries will be placeholders");
        }
        if self.notify.webhook_url.is_empty() {
            tracing::warn!("no webhook configured; digests will not be delivered");
        }
    }

    /// Clamp values into workable ranges.
    pub fn sanitize(&mut self) {
        self.pipeline.enrich_concurrency = self.pipeline.enrich_concurrency.clamp(1, 16);

        self.ranking.default_top_n = self.ranking.default_top_n.max(1);
        for v in self.ranking.top_n.values_mut() {
            *v = (*v).max(1);
        }

        self.fetch.max_articles_default = self.fetch.max_articles_default.max(1);
        for v in self.fetch.max_articles.values_mut() {
            *v = (*v).max(1);
        }
        self.fetch.max_attempts = self.fetch.max_attempts.clamp(1, 10);
        self.fetch.timeout_secs = self.fetch.timeout_secs.max(1);
        self.fetch.content_timeout_secs = self.fetch.content_timeout_secs.max(1);

        self.ai.temperature = if self.ai.temperature.is_finite() {
            self.ai.temperature.clamp(0.0, 2.0)
        } else {
            AiConfig::default().temperature
        };
        self.ai.summary_max_tokens = self.ai.summary_max_tokens.max(64);
        self.ai.analysis_max_tokens = self.ai.analysis_max_tokens.max(self.ai.summary_max_tokens);
        self.ai.timeout_secs = self.ai.timeout_secs.max(1);

        let s = &mut self.summary;
        s.full_min_words = s.full_min_words.min(s.full_max_words);
        s.headline_min_words = s.headline_min_words.min(s.headline_max_words);
        s.full_max_words = s.full_max_words.max(1);
        s.headline_max_words = s.headline_max_words.max(1);

        self.notify.max_message_chars = self
            .notify
            .max_message_chars
            .clamp(crate::notify::digest::MIN_MESSAGE_CHARS, 40_000);
        self.notify.per_category_cap = self.notify.per_category_cap.max(1);
        self.notify.max_attempts = self.notify.max_attempts.clamp(1, 10);
        self.notify.timeout_secs = self.notify.timeout_secs.max(1);

        if crate::scheduler::parse_fire_time(&self.schedule.fire_time).is_none() {
            tracing::warn!(
                fire_time = %self.schedule.fire_time,
                "invalid fire_time; scheduler will fall back to 18:00"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn defaults_match_documented_values() {
        let cfg = DigestConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.schedule.fire_time, "18:00");
        assert_eq!(cfg.ranking.top_n_for(Category::World), 5);
        assert_eq!(cfg.fetch.max_articles_for(Category::Business), 5);
        assert_eq!(cfg.fetch.max_attempts, 3);
        assert_eq!(cfg.notify.max_message_chars, 13_000);
        assert_eq!(cfg.ai.analysis_max_tokens, 2500);
        assert_eq!(cfg.pipeline.parsed_categories(), Category::ALL.to_vec());
    }

    #[test]
    fn per_category_overrides_and_sanitizing() {
        let toml = r#"
            [pipeline]
            categories = ["technology", "Sports", "World", "TECHNOLOGY"]
            enrich_concurrency = 0

            [ranking]
            default_top_n = 0
            top_n = { technology = 3 }

            [fetch]
            max_articles_default = 7
            max_articles = { World = 2 }
            max_attempts = 0

            [[feeds]]
            source = "VNExpress"
            category = "Technology"
            url = "https://example.test/tech.rss"
        "#;
        let cfg = DigestConfig::from_toml_str(toml).unwrap();
        assert_eq!(
            cfg.pipeline.parsed_categories(),
            vec![Category::Technology, Category::World]
        );
        assert_eq!(cfg.pipeline.enrich_concurrency, 1);
        assert_eq!(cfg.ranking.top_n_for(Category::Technology), 3);
        assert_eq!(cfg.ranking.top_n_for(Category::Business), 1);
        assert_eq!(cfg.fetch.max_articles_for(Category::World), 2);
        assert_eq!(cfg.fetch.max_articles_for(Category::Business), 7);
        assert_eq!(cfg.fetch.max_attempts, 1);
        assert_eq!(cfg.feeds[0].source, Source::VnExpress);
    }

    #[serial_test::serial]
    #[test]
    fn env_placeholders_resolve_secrets() {
        env::set_var(ENV_GEMINI_KEY, " k-123 ");
        env::remove_var(ENV_SLACK_WEBHOOK);
        let mut cfg = DigestConfig::default();
        cfg.resolve_secrets();
        assert_eq!(cfg.ai.api_key, "k-123");
        assert_eq!(cfg.notify.webhook_url, "");
        env::remove_var(ENV_GEMINI_KEY);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_path_then_fallback() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);

        let cfg = DigestConfig::load_default().unwrap();
        assert_eq!(cfg.schedule.fire_time, "18:00");

        let p = tmp.path().join("custom.toml");
        fs::write(&p, "[schedule]\nfire_time = \"07:30\"\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = DigestConfig::load_default().unwrap();
        assert_eq!(cfg.schedule.fire_time, "07:30");

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(DigestConfig::load_default().is_err());

        env::remove_var(ENV_CONFIG_PATH);
        env::set_current_dir(&old).unwrap();
    }
}
