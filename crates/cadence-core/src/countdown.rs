//! Live countdown to the next reminder.
//!
//! [`CountdownState`] is the pure view of a [`NextTrigger`] at one instant.
//! [`Ticker`] re-evaluates it on a fixed period as a background tokio task,
//! pulling a fresh [`Snapshot`] every tick so edits made between ticks are
//! picked up. When a trigger is imminent the ticker re-arms for the trigger
//! instant rather than waiting out the rest of the period.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::reminder::Snapshot;
use crate::scanner::{NextTrigger, next_trigger};

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Supplies the reminder records for one evaluation.
pub trait SnapshotSource {
    fn snapshot(&self) -> anyhow::Result<Snapshot>;
}

impl SnapshotSource for Snapshot {
    fn snapshot(&self) -> anyhow::Result<Snapshot> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    NoUpcoming,
    Triggered,
    Remaining(chrono::Duration),
}

impl CountdownState {
    pub fn evaluate(next: Option<&NextTrigger>, now: DateTime<Utc>) -> Self {
        match next {
            None => Self::NoUpcoming,
            Some(trigger) if trigger.is_imminent => Self::Triggered,
            Some(trigger) => Self::Remaining(trigger.remaining(now)),
        }
    }
}

impl fmt::Display for CountdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoUpcoming => write!(f, "No upcoming reminders"),
            Self::Triggered => write!(f, "Reminder triggered! Recalculating..."),
            Self::Remaining(left) => {
                let total = left.num_seconds().max(0);
                let days = total / 86_400;
                let hours = (total % 86_400) / 3_600;
                let minutes = (total % 3_600) / 60;
                let seconds = total % 60;

                write!(f, "Next reminder in: ")?;
                if days > 0 {
                    write!(f, "{days}d ")?;
                }
                if hours > 0 || days > 0 {
                    write!(f, "{hours}h ")?;
                }
                if minutes > 0 || hours > 0 || days > 0 {
                    write!(f, "{minutes}m ")?;
                }
                write!(f, "{seconds}s")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CountdownEvent {
    pub at: DateTime<Utc>,
    pub next: Option<NextTrigger>,
    pub state: CountdownState,
}

/// Periodically evaluates the next trigger and reports it on `events`.
pub struct Ticker<S, Tz> {
    source: S,
    tz: Tz,
    events: mpsc::UnboundedSender<CountdownEvent>,
    cancel: CancellationToken,
    period: Duration,
}

impl<S, Tz> Ticker<S, Tz>
where
    S: SnapshotSource,
    Tz: TimeZone,
{
    pub fn new(
        source: S,
        tz: Tz,
        events: mpsc::UnboundedSender<CountdownEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            tz,
            events,
            cancel,
            period: DEFAULT_PERIOD,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period.max(Duration::from_millis(1));
        self
    }

    /// Evaluates once against the current snapshot.
    pub fn evaluate(&self, now: &DateTime<Tz>) -> anyhow::Result<CountdownEvent> {
        let snapshot = self.source.snapshot()?;
        let next = next_trigger(&snapshot.main, &snapshot.tasks, now);
        let at = now.with_timezone(&Utc);
        Ok(CountdownEvent {
            at,
            next,
            state: CountdownState::evaluate(next.as_ref(), at),
        })
    }

    /// Runs until the cancellation token fires or the receiver goes away.
    ///
    /// ```rust,ignore
    /// let ticker = Ticker::new(store, chrono::Local, tx, cancel.child_token());
    /// tokio::spawn(ticker.run());
    /// ```
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = self.period.as_millis() as u64, "countdown ticker started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("countdown ticker cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let now = Utc::now().with_timezone(&self.tz);
                    let event = match self.evaluate(&now) {
                        Ok(event) => event,
                        Err(err) => {
                            warn!(error = %err, "failed to load reminders; skipping tick");
                            continue;
                        }
                    };

                    if let Some(trigger) = event.next.filter(|trigger| trigger.is_imminent) {
                        // Land just past the trigger so the next scan moves on from it.
                        let wait = trigger.remaining(event.at).to_std().unwrap_or_default()
                            + Duration::from_millis(1);
                        debug!(wait_ms = wait.as_millis() as u64, "trigger imminent; re-arming");
                        interval.reset_at(Instant::now() + wait);
                    }

                    if self.events.send(event).is_err() {
                        warn!("countdown receiver closed, stopping");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::{CountdownState, Ticker};
    use crate::reminder::{MainReminderConfig, Snapshot, TaskReminder};
    use crate::scanner::NextTrigger;

    fn remaining(seconds: i64) -> String {
        CountdownState::Remaining(chrono::Duration::seconds(seconds)).to_string()
    }

    #[test]
    fn formats_only_significant_units() {
        assert_eq!(remaining(42), "Next reminder in: 42s");
        assert_eq!(remaining(5 * 60 + 3), "Next reminder in: 5m 3s");
        assert_eq!(remaining(2 * 3_600 + 7), "Next reminder in: 2h 0m 7s");
        assert_eq!(remaining(86_400 + 61), "Next reminder in: 1d 0h 1m 1s");
        assert_eq!(
            CountdownState::NoUpcoming.to_string(),
            "No upcoming reminders"
        );
    }

    #[test]
    fn state_follows_next_trigger() {
        let now = Utc
            .with_ymd_and_hms(2026, 6, 1, 8, 0, 0)
            .single()
            .expect("valid now");
        let soon = NextTrigger {
            instant: now + chrono::Duration::minutes(5),
            is_imminent: false,
        };
        assert_eq!(
            CountdownState::evaluate(Some(&soon), now),
            CountdownState::Remaining(chrono::Duration::minutes(5))
        );

        let fired = NextTrigger {
            is_imminent: true,
            ..soon
        };
        assert_eq!(
            CountdownState::evaluate(Some(&fired), now),
            CountdownState::Triggered
        );
        assert_eq!(CountdownState::evaluate(None, now), CountdownState::NoUpcoming);
    }

    #[tokio::test]
    async fn ticker_reports_and_stops_on_cancel() {
        let snapshot = Snapshot {
            main: MainReminderConfig::default(),
            tasks: vec![TaskReminder::new(
                1,
                "Later".to_string(),
                Utc::now() + chrono::Duration::hours(1),
            )],
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let ticker =
            Ticker::new(snapshot, Utc, tx, cancel.clone()).with_period(Duration::from_millis(20));
        let task = tokio::spawn(ticker.run());

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("tick within timeout")
            .expect("ticker still running");
        assert!(matches!(event.state, CountdownState::Remaining(_)));

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), task).await;
        assert!(result.is_ok(), "ticker should finish after cancel");
    }

    #[tokio::test]
    async fn ticker_moves_past_an_imminent_trigger() {
        let snapshot = Snapshot {
            main: MainReminderConfig::default(),
            tasks: vec![TaskReminder::new(
                1,
                "Now".to_string(),
                Utc::now() + chrono::Duration::milliseconds(150),
            )],
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let ticker =
            Ticker::new(snapshot, Utc, tx, cancel.clone()).with_period(Duration::from_secs(60));
        let task = tokio::spawn(ticker.run());

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("first tick")
            .expect("ticker still running");
        assert_eq!(first.state, CountdownState::Triggered);

        // The period is a minute, so this event only arrives via the re-arm.
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("re-armed tick")
            .expect("ticker still running");
        assert_eq!(second.state, CountdownState::NoUpcoming);

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
    }

    #[tokio::test]
    async fn ticker_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let ticker = Ticker::new(Snapshot::default(), Utc, tx, CancellationToken::new())
            .with_period(Duration::from_millis(10));

        let result = tokio::time::timeout(Duration::from_secs(2), ticker.run()).await;
        assert!(result.is_ok(), "ticker should stop once nobody listens");
    }
}
