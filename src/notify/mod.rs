// src/notify/mod.rs
pub mod digest;
pub mod slack;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;

/// Chat transport: one call posts one message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, text: &str) -> Result<()>;

    /// `false` when the channel has no destination configured.
    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
}

impl DeliveryReport {
    /// The digest counts as delivered if at least one message went out.
    pub fn is_success(&self) -> bool {
        self.delivered > 0
    }
}

/// Sequential sender with a fixed pause between posts.
pub struct Delivery {
    notifier: Arc<dyn Notifier>,
    pacing: Duration,
}

impl Delivery {
    pub fn new(notifier: Arc<dyn Notifier>, pacing: Duration) -> Self {
        Self { notifier, pacing }
    }

    /// Post every message in order. A failed post is logged and the rest are
    /// still sent.
    pub async fn send(&self, messages: &[String]) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if messages.is_empty() {
            return report;
        }
        if !self.notifier.is_enabled() {
            tracing::warn!(
                target: "notify",
                notifier = self.notifier.name(),
                messages = messages.len(),
                "notifier disabled; digest not sent"
            );
            return report;
        }

        for (i, text) in messages.iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            report.attempted += 1;
            match self.notifier.post(text).await {
                Ok(()) => {
                    report.delivered += 1;
                    counter!("digest_messages_sent_total", "outcome" => "ok").increment(1);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "notify",
                        error = ?e,
                        notifier = self.notifier.name(),
                        index = i,
                        "message send failed; continuing"
                    );
                    counter!("digest_messages_sent_total", "outcome" => "error").increment(1);
                }
            }
        }

        tracing::info!(
            target: "notify",
            attempted = report.attempted,
            delivered = report.delivered,
            "digest delivery finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records posts; fails the ones whose index is listed.
    struct Recorder {
        fail_at: Vec<usize>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn post(&self, text: &str) -> Result<()> {
            let mut seen = self.seen.lock().unwrap();
            let idx = seen.len();
            seen.push(text.to_string());
            if self.fail_at.contains(&idx) {
                anyhow::bail!("boom");
            }
            Ok(())
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failure_does_not_stop_later_messages() {
        let rec = Arc::new(Recorder {
            fail_at: vec![0],
            seen: Mutex::new(vec![]),
        });
        let d = Delivery::new(rec.clone(), Duration::from_millis(200));
        let msgs = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let report = d.send(&msgs).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert!(report.is_success());
        assert_eq!(rec.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn all_failed_is_not_success() {
        let rec = Arc::new(Recorder {
            fail_at: vec![0, 1],
            seen: Mutex::new(vec![]),
        });
        let d = Delivery::new(rec, Duration::from_millis(200));
        let report = d.send(&["a".to_string(), "b".to_string()]).await;
        assert!(!report.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_inserted_between_posts() {
        let rec = Arc::new(Recorder {
            fail_at: vec![],
            seen: Mutex::new(vec![]),
        });
        let d = Delivery::new(rec, Duration::from_millis(200));
        let start = tokio::time::Instant::now();
        d.send(&["a".to_string(), "b".to_string(), "c".to_string()]).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(400), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");
    }
}
