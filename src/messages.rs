//! Telegram message bodies (Markdown parse mode). Pure formatting only.

use crate::engine::{Observation, Severity, format_timestamp};
use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use std::time::Duration;

const ERROR_DETAIL_LIMIT: usize = 100;

/// `0xde605a91...51391312a`-style short form: first 10 and last 8 characters.
pub fn shorten_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 18 {
        return address.to_string();
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 8..].iter().collect();
    format!("{head}...{tail}")
}

fn count_text(obs: &Observation) -> String {
    obs.count
        .map(|c| c.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

pub fn alert_message(obs: &Observation, severity: Severity) -> String {
    format!(
        "{level} 🎯\n\
         \n\
         📊 **Pending Orders: {count}**\n\
         {trend} Change: {change} orders\n\
         📈 Threshold: {threshold}\n\
         ⏰ Time: {time}\n\
         \n\
         🔗 Contract: `{contract}`\n\
         \n\
         #PendingOrders #WorldChain #Alert",
        level = severity.label(),
        count = count_text(obs),
        trend = obs.change.trend.emoji(),
        change = obs.change,
        threshold = obs.threshold,
        time = obs.formatted_time(),
        contract = shorten_address(&obs.contract),
    )
}

pub fn status_message(obs: &Observation) -> String {
    let Some(count) = obs.count else {
        return format!(
            "❌ **Status Check Failed**\n⏰ {}\n🔄 Error count: {}",
            obs.formatted_time(),
            obs.error_count
        );
    };

    let status = if count <= U256::from(obs.threshold) {
        "✅"
    } else {
        "⚠️"
    };

    format!(
        "{status} **Status Update**\n\
         \n\
         📊 Pending Orders: {count}\n\
         📈 Threshold: {threshold}\n\
         ⏰ Last Check: {time}\n\
         🔄 Monitoring: Active\n\
         \n\
         #Status #PendingOrders",
        threshold = obs.threshold,
        time = obs.formatted_time(),
    )
}

pub fn error_message(consecutive_errors: u32, now: DateTime<Utc>, error: &str) -> String {
    let detail: String = error.chars().take(ERROR_DETAIL_LIMIT).collect();
    format!(
        "❌ **Monitoring Error**\n\
         \n\
         🔄 Consecutive errors: {consecutive_errors}\n\
         ⏰ Time: {time}\n\
         🔧 Error: {detail}...\n\
         \n\
         Bot will continue trying...\n\
         \n\
         #Error #Monitoring",
        time = format_timestamp(now),
    )
}

pub fn startup_message(bot_name: &str, threshold: u64, interval: Duration, contract: &str) -> String {
    format!(
        "🚀 **{bot_name} Started**\n\
         \n\
         ✅ Bot is now monitoring pending orders\n\
         📊 Alert threshold: {threshold}\n\
         ⏰ Check interval: {interval}s\n\
         🔗 Contract: `{contract}`\n\
         \n\
         🎯 Will alert when pending orders > {threshold}\n\
         \n\
         #BotStarted #Monitoring",
        interval = interval.as_secs(),
        contract = shorten_address(contract),
    )
}

pub fn stopped_message() -> String {
    "🛑 **Bot Stopped**\n\nMonitoring has been stopped.\n\n#BotStopped".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Change, MonitorState};
    use chrono::TimeZone;

    const CONTRACT: &str = "0xde605a918c466e74a2a12865efe616d51391312a";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 17, 8, 30, 0).unwrap()
    }

    fn observation(previous: u64, count: Option<u64>) -> Observation {
        let mut state = MonitorState {
            previous_count: U256::from(previous),
            ..MonitorState::default()
        };
        state.observe(count.map(U256::from), now(), 18, CONTRACT)
    }

    #[test]
    fn shortens_long_addresses_only() {
        assert_eq!(shorten_address(CONTRACT), "0xde605a91...1391312a");
        assert_eq!(shorten_address("0x1234"), "0x1234");
    }

    #[test]
    fn alert_message_layout() {
        let msg = alert_message(&observation(15, Some(24)), Severity::Medium);
        let expected = "⚠️ MEDIUM ALERT 🎯\n\
                        \n\
                        📊 **Pending Orders: 24**\n\
                        📈 Change: +9 orders\n\
                        📈 Threshold: 18\n\
                        ⏰ Time: 2025-09-17 08:30:00 UTC\n\
                        \n\
                        🔗 Contract: `0xde605a91...1391312a`\n\
                        \n\
                        #PendingOrders #WorldChain #Alert";
        assert_eq!(msg, expected);
    }

    #[test]
    fn alert_message_shows_decrease() {
        let obs = observation(40, Some(30));
        assert_eq!(obs.change, Change::between(U256::from(30), U256::from(40)));
        let msg = alert_message(&obs, Severity::High);
        assert!(msg.starts_with("🚨 HIGH ALERT"));
        assert!(msg.contains("📉 Change: -10 orders"));
    }

    #[test]
    fn status_message_marks_counts_above_threshold() {
        assert!(status_message(&observation(0, Some(18))).starts_with("✅ **Status Update**"));
        assert!(status_message(&observation(0, Some(19))).starts_with("⚠️ **Status Update**"));
    }

    #[test]
    fn failed_status_reports_error_count() {
        let mut state = MonitorState::new();
        state.record_failure();
        state.record_failure();
        let obs = state.observe(None, now(), 18, CONTRACT);
        assert_eq!(
            status_message(&obs),
            "❌ **Status Check Failed**\n⏰ 2025-09-17 08:30:00 UTC\n🔄 Error count: 2"
        );
    }

    #[test]
    fn error_message_truncates_detail() {
        let long = "x".repeat(250);
        let msg = error_message(3, now(), &long);
        assert!(msg.contains("🔄 Consecutive errors: 3"));
        assert!(msg.contains(&format!("🔧 Error: {}...", "x".repeat(100))));
        assert!(!msg.contains(&"x".repeat(101)));
    }

    #[test]
    fn startup_message_mentions_threshold_twice() {
        let msg = startup_message("Pending Orders Monitor", 18, Duration::from_secs(300), CONTRACT);
        assert!(msg.starts_with("🚀 **Pending Orders Monitor Started**"));
        assert!(msg.contains("⏰ Check interval: 300s"));
        assert_eq!(msg.matches("18").count(), 2);
    }
}
