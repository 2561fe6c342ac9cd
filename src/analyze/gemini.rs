//! Generative text API: provider abstraction + Gemini `generateContent` client.
//!
//! Calls resolve to one of three outcomes:
//! * `Ok(Generated::Text(_))` - usable output
//! * `Ok(Generated::Degraded(_))` - expected degradation (no key, non-2xx, empty body)
//! * `Err(_)` - transport failure or undecodable response

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AiConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeReason {
    MissingCredential,
    Status(u16),
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated {
    Text(String),
    Degraded(DegradeReason),
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<Generated>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Google Gemini `v1beta/models/{model}:generateContent`.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
    temperature: f32,
}

impl GeminiClient {
    /// `cfg.api_key` must already be resolved (no `"ENV"` placeholder).
    pub fn new(cfg: &AiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("news-digest/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building gemini http client")?;
        Ok(Self {
            http,
            api_key: cfg.api_key.trim().to_string(),
            model: cfg.model.clone(),
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            temperature: cfg.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base, self.model)
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}
#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Req<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize, Default)]
struct Resp {
    #[serde(default)]
    candidates: Vec<Candidate>,
}
#[derive(Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: Option<RespContent>,
}
#[derive(Deserialize, Default)]
struct RespContent {
    #[serde(default)]
    parts: Vec<RespPart>,
}
#[derive(Deserialize, Default)]
struct RespPart {
    #[serde(default)]
    text: Option<String>,
}

impl Resp {
    /// `candidates[0].content.parts[0].text`
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
            .filter(|t| !t.trim().is_empty())
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<Generated> {
        if self.api_key.is_empty() {
            return Ok(Generated::Degraded(DegradeReason::MissingCredential));
        }

        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens,
                temperature: self.temperature,
            },
        };

        let resp = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&req)
            .send()
            .await
            .context("gemini post")?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), model = %self.model, "gemini non-2xx");
            return Ok(Generated::Degraded(DegradeReason::Status(status.as_u16())));
        }

        let body: Resp = resp.json().await.context("gemini response body")?;
        Ok(match body.first_text() {
            Some(text) => Generated::Text(text.trim().to_string()),
            None => Generated::Degraded(DegradeReason::EmptyResponse),
        })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
