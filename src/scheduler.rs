// src/scheduler.rs
//! Daily timer. Owns its own task and posts [`RunSignal`]s to the
//! orchestrator over a capacity-1 channel; re-entrancy is the orchestrator's job.

use chrono::{DateTime, Days, Local, LocalResult, NaiveTime, TimeZone, Utc};
use metrics::counter;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_FIRE_TIME: &str = "18:00";

fn default_fire_time() -> NaiveTime {
    NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Accepts `HH:MM` or `HH:MM:SS` (24h).
pub fn parse_fire_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// Next occurrence of `configured` strictly after `now`, in `now`'s zone.
///
/// Invalid input falls back to 18:00 with a warning. A wall time that
/// falls in a DST gap is pushed forward by an hour; an ambiguous one takes
/// the earlier instant.
pub fn compute_next_fire<Tz: TimeZone>(configured: &str, now: &DateTime<Tz>) -> DateTime<Tz> {
    let at = parse_fire_time(configured).unwrap_or_else(|| {
        tracing::warn!(
            target: "scheduler",
            configured,
            fallback = DEFAULT_FIRE_TIME,
            "invalid fire time; using fallback"
        );
        default_fire_time()
    });

    let tz = now.timezone();
    let today = now.date_naive();
    for offset in 0..=2u64 {
        let naive = (today + Days::new(offset)).and_time(at);
        let candidate = match tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => t,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => match tz.from_local_datetime(&(naive + chrono::Duration::hours(1))).earliest() {
                Some(t) => t,
                None => continue,
            },
        };
        if candidate > *now {
            return candidate;
        }
    }
    now.clone() + chrono::Duration::days(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
    Firing,
}

/// "Run now" message from the scheduler to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSignal {
    pub scheduled_for: DateTime<Utc>,
}

pub struct Scheduler {
    state: watch::Receiver<SchedulerState>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Spawn the timer task. Stops when `parent` (or [`Scheduler::stop`])
    /// cancels, or when the receiver is dropped.
    pub fn start(fire_time: impl Into<String>, parent: &CancellationToken) -> (Self, mpsc::Receiver<RunSignal>) {
        let fire_time = fire_time.into();
        let (tx, rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
        let cancel = parent.child_token();
        let handle = tokio::spawn(run_timer(fire_time, tx, state_tx, cancel.clone()));
        (
            Self {
                state: state_rx,
                cancel,
                handle,
            },
            rx,
        )
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(target: "scheduler", error = ?e, "timer task ended abnormally");
        }
    }
}

async fn run_timer(
    fire_time: String,
    tx: mpsc::Sender<RunSignal>,
    state: watch::Sender<SchedulerState>,
    cancel: CancellationToken,
) {
    let mut last_fire: Option<DateTime<Local>> = None;
    loop {
        let now = Local::now();
        // Never re-fire the same slot if the wall clock lags the timer.
        let base = match last_fire {
            Some(l) if l >= now => l,
            _ => now,
        };
        let next = compute_next_fire(&fire_time, &base);
        let wait = (next - now).to_std().unwrap_or_default();

        state.send_replace(SchedulerState::Armed);
        tracing::info!(target: "scheduler", next_fire = %next, wait_secs = wait.as_secs(), "armed");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        state.send_replace(SchedulerState::Firing);
        last_fire = Some(next);
        let signal = RunSignal {
            scheduled_for: next.with_timezone(&Utc),
        };
        match tx.try_send(signal) {
            Ok(()) => {
                counter!("digest_scheduler_fires_total").increment(1);
                tracing::info!(target: "scheduler", "fired");
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::info!(target: "scheduler", "previous signal still pending; coalesced");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(target: "scheduler", "orchestrator gone; stopping timer");
                break;
            }
        }
        state.send_replace(SchedulerState::Idle);
    }
    state.send_replace(SchedulerState::Idle);
    tracing::info!(target: "scheduler", "stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn parses_both_formats() {
        assert_eq!(parse_fire_time("07:30"), NaiveTime::from_hms_opt(7, 30, 0));
        assert_eq!(parse_fire_time(" 07:30:15 "), NaiveTime::from_hms_opt(7, 30, 15));
        assert_eq!(parse_fire_time("25:00"), None);
        assert_eq!(parse_fire_time("six pm"), None);
    }

    #[test]
    fn later_today_when_not_yet_passed() {
        let next = compute_next_fire("18:00", &utc("2024-05-01T09:00:00Z"));
        assert_eq!(next, utc("2024-05-01T18:00:00Z"));
    }

    #[test]
    fn rolls_to_tomorrow_when_passed_or_equal() {
        assert_eq!(
            compute_next_fire("18:00", &utc("2024-05-01T18:30:00Z")),
            utc("2024-05-02T18:00:00Z")
        );
        assert_eq!(
            compute_next_fire("18:00", &utc("2024-05-01T18:00:00Z")),
            utc("2024-05-02T18:00:00Z")
        );
    }

    #[test]
    fn invalid_input_falls_back_to_default() {
        let next = compute_next_fire("not-a-time", &utc("2024-05-01T09:00:00Z"));
        assert_eq!(next, utc("2024-05-01T18:00:00Z"));
    }

    #[test]
    fn respects_the_zone_of_now() {
        let hanoi = FixedOffset::east_opt(7 * 3600).unwrap();
        let now = utc("2024-12-31T12:00:00Z").with_timezone(&hanoi); // 19:00 local
        let next = compute_next_fire("18:00", &now);
        assert_eq!(next.with_timezone(&Utc), utc("2025-01-01T11:00:00Z"));
    }

    #[tokio::test]
    async fn start_arms_and_stop_returns_to_idle() {
        let parent = CancellationToken::new();
        let (scheduler, _rx) = Scheduler::start("03:00", &parent);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(scheduler.state(), SchedulerState::Armed);
        let state = scheduler.state.clone();
        scheduler.stop().await;
        assert_eq!(*state.borrow(), SchedulerState::Idle);
        assert!(!parent.is_cancelled());
    }
}
