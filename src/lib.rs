// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod rank;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::DigestConfig;
pub use crate::model::{Article, Category, EnrichedArticle, Source};
pub use crate::orchestrator::Orchestrator;
pub use crate::report::{RunOutcome, RunReport};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_LOG_JSON: &str = "DIGEST_LOG_JSON";
pub const DEFAULT_LOG_FILTER: &str =
    "news_digest=info,ingest=info,summarize=info,enhance=info,notify=info,pipeline=info,scheduler=info,warn";

/// Install the global subscriber. `RUST_LOG` wins over the default filter;
/// `DIGEST_LOG_JSON=1` switches to JSON lines. Safe to call twice.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(ENV_LOG_JSON).ok().is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
