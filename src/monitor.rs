use crate::config::Config;
use crate::engine::{AlertDecision, MonitorState, Observation, StatusTimer, decide};
use crate::error::FetchError;
use crate::messages;
use crate::notifier::Notifier;
use crate::reader::PendingOrdersSource;
use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// What one cycle did, for logging and tests.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub observation: Observation,
    pub decision: AlertDecision,
    pub alert_sent: bool,
    pub status_sent: bool,
    pub escalated: bool,
}

/// Fetch, decide, notify, sleep. One cycle at a time; the state is only
/// touched between fetches.
pub struct Monitor<S, N> {
    source: S,
    notifier: N,
    state: MonitorState,
    status_timer: StatusTimer,
    threshold: u64,
    interval: Duration,
    contract: String,
}

impl<S, N> Monitor<S, N>
where
    S: PendingOrdersSource,
    N: Notifier,
{
    pub fn new(source: S, notifier: N, config: &Config) -> Self {
        Self::with_settings(
            source,
            notifier,
            config.alert_threshold,
            config.check_interval,
            &config.contract_hex(),
            Utc::now(),
        )
    }

    pub fn with_settings(
        source: S,
        notifier: N,
        threshold: u64,
        interval: Duration,
        contract: &str,
        started_at: DateTime<Utc>,
    ) -> Self {
        Monitor {
            source,
            notifier,
            state: MonitorState::new(),
            status_timer: StatusTimer::new(started_at, interval),
            threshold,
            interval,
            contract: contract.to_string(),
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    async fn notify(&self, text: &str) -> bool {
        match self.notifier.send(text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Notification not delivered");
                false
            }
        }
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let result = self.source.pending_orders_count().await;
        self.process(result, Utc::now()).await
    }

    /// Applies one fetch result: decide against the previous count, update
    /// the state, then send whatever notifications are due.
    pub async fn process(
        &mut self,
        result: Result<U256, FetchError>,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        let (count, failure) = match result {
            Ok(count) => {
                self.state.record_success();
                (Some(count), None)
            }
            Err(e) => {
                let streak = self.state.record_failure();
                warn!(error = %e, consecutive_errors = streak, "Pending orders check failed");
                (None, Some(e))
            }
        };

        let decision = decide(count, &self.state, self.threshold);
        let observation = self
            .state
            .observe(count, now, self.threshold, &self.contract);

        match count {
            Some(count) => info!("Check completed - Pending orders: {}", count),
            None => info!("Check completed - Pending orders: unavailable"),
        }

        let mut alert_sent = false;
        if decision.should_alert {
            let text = messages::alert_message(&observation, decision.severity);
            alert_sent = self.notify(&text).await;
            if alert_sent {
                info!(
                    severity = ?decision.severity,
                    "Alert sent for {} pending orders",
                    count.unwrap_or_default()
                );
            }
        }

        let mut status_sent = false;
        if self.status_timer.is_due(now, self.state.last_check_time) {
            let text = messages::status_message(&observation);
            status_sent = self.notify(&text).await;
            if status_sent {
                info!("Status update sent");
            }
        }

        let mut escalated = false;
        if let Some(e) = failure {
            if let Some(streak) = self.state.take_error_escalation() {
                error!(consecutive_errors = streak, "Repeated failures, sending error notification");
                let text = messages::error_message(streak, now, &e.to_string());
                self.notify(&text).await;
                escalated = true;
            }
        }

        CycleOutcome {
            observation,
            decision,
            alert_sent,
            status_sent,
            escalated,
        }
    }

    /// Runs cycles until `shutdown` resolves. Failures never end the loop.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("Starting monitoring loop...");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.run_cycle() => {}
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = sleep(self.interval) => {}
            }
        }

        info!("Monitoring loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Severity;
    use crate::error::NotificationError;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use teloxide::{ApiError, RequestError};

    const CONTRACT: &str = "0xde605a918c466e74a2a12865efe616d51391312a";
    const INTERVAL: Duration = Duration::from_secs(300);

    struct ScriptedSource {
        results: Mutex<VecDeque<Result<U256, FetchError>>>,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<u64, FetchError>>) -> Self {
            ScriptedSource {
                results: Mutex::new(results.into_iter().map(|r| r.map(U256::from)).collect()),
            }
        }
    }

    impl PendingOrdersSource for ScriptedSource {
        async fn pending_orders_count(&self) -> Result<U256, FetchError> {
            let next = self.results.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(FetchError::Transport("script exhausted".into())))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn messages(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str) -> Result<(), NotificationError> {
            self.sent.lock().unwrap().push(text.to_string());
            if self.fail {
                Err(NotificationError::Telegram(RequestError::Api(ApiError::ChatNotFound)))
            } else {
                Ok(())
            }
        }
    }

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 17, 0, 0, 0).unwrap()
    }

    /// A time well inside an hour, so no status message is due.
    fn quiet(minutes: i64) -> DateTime<Utc> {
        started() + chrono::TimeDelta::minutes(10 + minutes)
    }

    fn monitor(notifier: RecordingNotifier) -> Monitor<ScriptedSource, RecordingNotifier> {
        Monitor::with_settings(
            ScriptedSource::new(vec![]),
            notifier,
            18,
            INTERVAL,
            CONTRACT,
            started(),
        )
    }

    fn timeout() -> FetchError {
        FetchError::Timeout(Duration::from_secs(30))
    }

    #[tokio::test]
    async fn alerts_once_per_distinct_high_count() {
        let mut m = monitor(RecordingNotifier::default());

        let first = m.process(Ok(U256::from(20)), quiet(0)).await;
        assert!(first.alert_sent);
        assert_eq!(first.decision.severity, Severity::Normal);

        let repeat = m.process(Ok(U256::from(20)), quiet(5)).await;
        assert!(!repeat.decision.should_alert);

        let higher = m.process(Ok(U256::from(24)), quiet(10)).await;
        assert!(higher.alert_sent);
        assert_eq!(higher.decision.severity, Severity::Medium);

        let messages = m.notifier().messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("🔔 ALERT"));
        assert!(messages[1].contains("Change: +4 orders"));
    }

    #[tokio::test]
    async fn count_below_threshold_is_silent() {
        let mut m = monitor(RecordingNotifier::default());
        let outcome = m.process(Ok(U256::from(5)), quiet(0)).await;
        assert!(!outcome.decision.should_alert);
        assert!(m.notifier().messages().is_empty());
        assert_eq!(m.state().previous_count, U256::from(5));
    }

    #[tokio::test]
    async fn failure_keeps_previous_count_and_never_alerts() {
        let mut m = monitor(RecordingNotifier::default());
        m.process(Ok(U256::from(20)), quiet(0)).await;

        let outcome = m.process(Err(timeout()), quiet(5)).await;
        assert!(!outcome.decision.should_alert);
        assert_eq!(outcome.observation.count, None);
        assert_eq!(m.state().previous_count, U256::from(20));
        assert_eq!(m.state().consecutive_error_count, 1);
    }

    #[tokio::test]
    async fn third_failure_escalates_then_counter_restarts() {
        let mut m = monitor(RecordingNotifier::default());

        for minute in 0..2 {
            let outcome = m.process(Err(timeout()), quiet(minute)).await;
            assert!(!outcome.escalated);
        }
        let third = m.process(Err(timeout()), quiet(2)).await;
        assert!(third.escalated);
        assert_eq!(m.state().consecutive_error_count, 0);

        let fourth = m.process(Err(timeout()), quiet(3)).await;
        assert!(!fourth.escalated);
        assert_eq!(m.state().consecutive_error_count, 1);

        let messages = m.notifier().messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("🔄 Consecutive errors: 3"));
        assert!(messages[0].contains("request timed out after 30s"));
    }

    #[tokio::test]
    async fn success_between_failures_prevents_escalation() {
        let mut m = monitor(RecordingNotifier::default());
        m.process(Err(timeout()), quiet(0)).await;
        m.process(Err(timeout()), quiet(1)).await;
        m.process(Ok(U256::from(3)), quiet(2)).await;
        let outcome = m.process(Err(timeout()), quiet(3)).await;

        assert!(!outcome.escalated);
        assert_eq!(m.state().consecutive_error_count, 1);
    }

    #[tokio::test]
    async fn status_sent_in_first_interval_of_the_hour() {
        let mut m = monitor(RecordingNotifier::default());
        let outcome = m.process(Ok(U256::from(3)), started()).await;
        assert!(outcome.status_sent);

        let later = m
            .process(Ok(U256::from(3)), started() + chrono::TimeDelta::seconds(3600 + 60))
            .await;
        assert!(later.status_sent);

        let messages = m.notifier().messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("✅ **Status Update**"));
    }

    #[tokio::test]
    async fn failed_notification_does_not_stop_the_cycle() {
        let notifier = RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        };
        let mut m = monitor(notifier);

        let outcome = m.process(Ok(U256::from(30)), quiet(0)).await;
        assert!(outcome.decision.should_alert);
        assert!(!outcome.alert_sent);
        assert_eq!(m.state().previous_count, U256::from(30));
        assert_eq!(m.notifier().messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_keeps_running_through_failures_until_shutdown() {
        let source = ScriptedSource::new(vec![Err(timeout()), Ok(25), Err(timeout())]);
        let mut m = Monitor::with_settings(
            source,
            RecordingNotifier::default(),
            18,
            INTERVAL,
            CONTRACT,
            Utc::now() - chrono::TimeDelta::minutes(30),
        );

        m.run(sleep(INTERVAL * 2 + Duration::from_secs(10))).await;

        assert_eq!(m.state().previous_count, U256::from(25));
        assert_eq!(m.state().consecutive_error_count, 1);
        let alerts: Vec<_> = m
            .notifier()
            .messages()
            .into_iter()
            .filter(|msg| msg.contains("Pending Orders: 25"))
            .collect();
        assert_eq!(alerts.len(), 1);
    }
}
