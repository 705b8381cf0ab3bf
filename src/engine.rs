//! Alert decisions for the pending-order count.
//!
//! [`decide`] is pure: it reads the previous count from [`MonitorState`] but
//! never changes it. The caller applies the cycle's outcome to the state
//! afterwards with [`MonitorState::observe`] and the error counters.

use alloy_primitives::U256;
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::time::Duration;

/// Consecutive fetch failures that trigger one error notification.
pub const ERROR_ESCALATION_THRESHOLD: u32 = 3;

/// Cadence the status timer is aligned to.
const STATUS_PERIOD_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Above the threshold by at most 5.
    Normal,
    /// Above the threshold by 6 to 10.
    Medium,
    /// Above the threshold by more than 10.
    High,
}

impl Severity {
    pub fn classify(count: U256, threshold: u64) -> Self {
        let threshold = U256::from(threshold);
        if count > threshold.saturating_add(U256::from(10)) {
            Severity::High
        } else if count > threshold.saturating_add(U256::from(5)) {
            Severity::Medium
        } else {
            Severity::Normal
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Normal => "🔔 ALERT",
            Severity::Medium => "⚠️ MEDIUM ALERT",
            Severity::High => "🚨 HIGH ALERT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn emoji(self) -> &'static str {
        match self {
            Trend::Up => "📈",
            Trend::Down => "📉",
            Trend::Flat => "➡️",
        }
    }
}

/// Signed difference between two counts, kept as direction plus magnitude so
/// 256-bit counts never overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub trend: Trend,
    pub magnitude: U256,
}

impl Change {
    pub fn flat() -> Self {
        Change {
            trend: Trend::Flat,
            magnitude: U256::ZERO,
        }
    }

    pub fn between(current: U256, previous: U256) -> Self {
        if current > previous {
            Change {
                trend: Trend::Up,
                magnitude: current - previous,
            }
        } else if current < previous {
            Change {
                trend: Trend::Down,
                magnitude: previous - current,
            }
        } else {
            Change::flat()
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.trend {
            Trend::Down => write!(f, "-{}", self.magnitude),
            Trend::Up | Trend::Flat => write!(f, "+{}", self.magnitude),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertDecision {
    pub should_alert: bool,
    pub severity: Severity,
}

/// Decides whether this cycle's count warrants an alert.
///
/// A count alerts when it is above `threshold` and differs from the previous
/// successful count; an unchanged count that is still high stays quiet. A
/// missing count (the fetch failed) never alerts.
pub fn decide(count: Option<U256>, state: &MonitorState, threshold: u64) -> AlertDecision {
    let Some(count) = count else {
        return AlertDecision {
            should_alert: false,
            severity: Severity::Normal,
        };
    };

    let should_alert = count > U256::from(threshold) && count != state.previous_count;
    let severity = if should_alert {
        Severity::classify(count, threshold)
    } else {
        Severity::Normal
    };

    AlertDecision {
        should_alert,
        severity,
    }
}

/// Snapshot of one monitoring cycle, taken before the state is updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub count: Option<U256>,
    pub previous_count: U256,
    pub change: Change,
    pub threshold: u64,
    pub timestamp: DateTime<Utc>,
    pub contract: String,
    pub error_count: u32,
}

impl Observation {
    pub fn formatted_time(&self) -> String {
        format_timestamp(self.timestamp)
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorState {
    /// Last successfully decoded count.
    pub previous_count: U256,
    pub last_check_time: Option<DateTime<Utc>>,
    pub consecutive_error_count: u32,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the cycle snapshot, then moves `previous_count` to `count`
    /// (when there is one) and stamps `last_check_time`.
    pub fn observe(
        &mut self,
        count: Option<U256>,
        now: DateTime<Utc>,
        threshold: u64,
        contract: &str,
    ) -> Observation {
        let observation = Observation {
            count,
            previous_count: self.previous_count,
            change: count
                .map(|c| Change::between(c, self.previous_count))
                .unwrap_or_else(Change::flat),
            threshold,
            timestamp: now,
            contract: contract.to_string(),
            error_count: self.consecutive_error_count,
        };

        if let Some(count) = count {
            self.previous_count = count;
        }
        self.last_check_time = Some(now);

        observation
    }

    pub fn record_success(&mut self) {
        self.consecutive_error_count = 0;
    }

    /// Returns the new consecutive failure count.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_error_count += 1;
        self.consecutive_error_count
    }

    /// Once enough failures have piled up, hands back the count to report and
    /// starts counting again from zero. At most one escalation per streak of
    /// [`ERROR_ESCALATION_THRESHOLD`] failures.
    pub fn take_error_escalation(&mut self) -> Option<u32> {
        if self.consecutive_error_count >= ERROR_ESCALATION_THRESHOLD {
            let count = self.consecutive_error_count;
            self.consecutive_error_count = 0;
            Some(count)
        } else {
            None
        }
    }
}

/// Hourly status trigger measured from process start.
///
/// Due when `(now - started_at) mod 1h < interval`. With a loop that sleeps
/// `interval` between checks this fires roughly once an hour, but the check
/// time drifts by the fetch latency each cycle, so an hour can be skipped or
/// hit twice. That approximation is kept on purpose.
#[derive(Debug, Clone, Copy)]
pub struct StatusTimer {
    started_at: DateTime<Utc>,
    interval: TimeDelta,
}

impl StatusTimer {
    pub fn new(started_at: DateTime<Utc>, interval: Duration) -> Self {
        StatusTimer {
            started_at,
            interval: TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Never due before the first completed check.
    pub fn is_due(&self, now: DateTime<Utc>, last_check: Option<DateTime<Utc>>) -> bool {
        if last_check.is_none() {
            return false;
        }

        let elapsed = (now - self.started_at).max(TimeDelta::zero());
        let into_period = elapsed.num_milliseconds() % STATUS_PERIOD_MS;
        into_period < self.interval.num_milliseconds()
    }
}
