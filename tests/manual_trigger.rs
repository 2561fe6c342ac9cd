// tests/manual_trigger.rs
//
// Manual single-category trigger (batched streaming) and the single-flight
// guard shared with scheduled runs.

mod common;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use common::*;
use news_digest::analyze::gemini::{Generated, TextGenerator};
use news_digest::model::{Category, Source};
use news_digest::orchestrator::{TriggerError, TRIGGER_BATCH};

/// Blocks every call until permits are added; signals when a call arrives.
struct GatedGenerator {
    entered: Notify,
    gate: Semaphore,
}

impl GatedGenerator {
    fn closed() -> Self {
        Self {
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }
}

#[async_trait]
impl TextGenerator for GatedGenerator {
    async fn generate(&self, _prompt: &str, _max_output_tokens: u32) -> Result<Generated> {
        self.entered.notify_one();
        let _permit = self.gate.acquire().await?;
        Ok(Generated::Text("Summary produced after the gate opened.".into()))
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

#[tokio::test]
async fn trigger_streams_batches_of_three() {
    let h = HarnessBuilder::new()
        .feed(Source::VnExpress, Category::Technology, TECH_RSS)
        .limits(limits(&[(Category::Technology, 10)]))
        .build();

    let report = h
        .orchestrator
        .trigger_aggregation(Category::Technology, &CancellationToken::new())
        .await
        .expect("not busy");

    assert_eq!(report.category, Some(Category::Technology));
    assert_eq!(report.processed, 7);
    assert_eq!(report.failed, 0);
    assert_eq!(report.batches_sent, 3);

    let sizes: Vec<usize> = h.notifier.messages().iter().map(|m| block_count(m)).collect();
    assert_eq!(sizes, vec![TRIGGER_BATCH, TRIGGER_BATCH, 1]);
}

#[tokio::test]
async fn trigger_with_no_new_articles_sends_nothing() {
    let h = HarnessBuilder::new()
        .feed(Source::VnExpress, Category::World, EMPTY_RSS)
        .build();

    let report = h
        .orchestrator
        .trigger_aggregation(Category::World, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.batches_sent, 0);
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn trigger_counts_placeholder_summaries_as_processed() {
    let h = HarnessBuilder::new()
        .feed(Source::VnExpress, Category::Technology, TECH_RSS)
        .limits(limits(&[(Category::Technology, 4)]))
        .generator(ScriptedGenerator::new("Fine summary.").degrading_on("Broken:"))
        .build();

    let report = h
        .orchestrator
        .trigger_aggregation(Category::Technology, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.processed, 4);
    assert_eq!(report.failed, 0);
    assert_eq!(report.batches_sent, 2);
}

#[tokio::test]
async fn runs_and_triggers_are_single_flight() {
    let gate = Arc::new(GatedGenerator::closed());
    let h = HarnessBuilder::new()
        .feed(Source::VnExpress, Category::Business, BUSINESS_RSS)
        .categories(&[Category::Business])
        .text_generator(gate.clone())
        .build();

    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.run(&CancellationToken::new()).await });

    gate.entered.notified().await;
    assert!(h.orchestrator.is_busy());
    assert!(h.orchestrator.run(&CancellationToken::new()).await.is_none());
    assert_eq!(
        h.orchestrator
            .trigger_aggregation(Category::Business, &CancellationToken::new())
            .await,
        Err(TriggerError::Busy)
    );

    gate.gate.add_permits(100);
    let report = first.await.unwrap().expect("first run completes");
    assert_eq!(report.category(Category::Business).unwrap().summarized, 3);
    assert!(!h.orchestrator.is_busy());
}
