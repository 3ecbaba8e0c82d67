//! Probe result and statistics model.
//!
//! A [`ProbeResult`] is owned by its prober and updated once per round.
//! Channels and notifiers only ever see cloned snapshots.

mod counter;
mod strategy;

pub use counter::*;
pub use strategy::*;

use crate::status::Status;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Consecutive raw outcomes required before the reported status flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Threshold {
    pub success: usize,
    pub failure: usize,
}

impl Default for Threshold {
    fn default() -> Self {
        Self {
            success: 1,
            failure: 1,
        }
    }
}

impl Threshold {
    /// Window size needed to evaluate either threshold.
    pub fn window(&self) -> usize {
        self.success.max(self.failure).max(1)
    }
}

/// Accumulated statistics for one prober.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub since: Option<DateTime<Utc>>,
    pub total: u64,
    pub status: BTreeMap<Status, u64>,
    #[serde(with = "humantime_serde")]
    pub up_time: Duration,
    #[serde(with = "humantime_serde")]
    pub down_time: Duration,
    pub status_counter: StatusCounter,
    pub notification_strategy_data: NotificationStrategyData,
}

impl Default for Stat {
    fn default() -> Self {
        Self {
            since: None,
            total: 0,
            status: BTreeMap::new(),
            up_time: Duration::ZERO,
            down_time: Duration::ZERO,
            status_counter: StatusCounter::default(),
            notification_strategy_data: NotificationStrategyData::default(),
        }
    }
}

impl Stat {
    /// Availability percentage over the accumulated up and down time.
    pub fn sla(&self) -> f64 {
        let total = self.up_time + self.down_time;
        if total.is_zero() {
            return 100.0;
        }
        self.up_time.as_secs_f64() / total.as_secs_f64() * 100.0
    }

    pub fn count(&self, status: Status) -> u64 {
        self.status.get(&status).copied().unwrap_or(0)
    }
}

/// Outcome of the most recent probe round plus history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub name: String,
    pub endpoint: String,
    pub start_time: DateTime<Utc>,
    pub start_timestamp: i64,
    #[serde(with = "humantime_serde")]
    pub round_trip_time: Duration,
    pub status: Status,
    pub pre_status: Status,
    pub message: String,
    pub latest_down_time: Option<DateTime<Utc>>,
    #[serde(with = "humantime_serde")]
    pub recovery_duration: Duration,
    pub stat: Stat,
}

impl Default for ProbeResult {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl ProbeResult {
    pub fn new(name: &str, endpoint: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            start_time: now,
            start_timestamp: now.timestamp_millis(),
            round_trip_time: Duration::ZERO,
            status: Status::Init,
            pre_status: Status::Init,
            message: String::new(),
            latest_down_time: None,
            recovery_duration: Duration::ZERO,
            stat: Stat::default(),
        }
    }

    /// Short human readable headline, e.g. `"api (https://x) ❌ down"`.
    pub fn title(&self) -> String {
        format!(
            "{} ({}) {} {}",
            self.name,
            self.endpoint,
            self.status.emoji(),
            self.status
        )
    }

    /// Whether this round moved the status away from its previous value.
    pub fn status_changed(&self) -> bool {
        self.status != self.pre_status
    }

    /// Fold one raw probe outcome into this result.
    ///
    /// `raw` is the status the check itself produced; the reported status
    /// only follows it once `threshold` consecutive identical outcomes were
    /// seen. `period` is the time credited to up/down statistics.
    pub fn finish_round(
        &mut self,
        start: DateTime<Utc>,
        round_trip: Duration,
        raw: Status,
        message: String,
        threshold: Threshold,
        period: Duration,
    ) {
        self.pre_status = self.status;
        self.start_time = start;
        self.start_timestamp = start.timestamp_millis();
        self.round_trip_time = round_trip;

        let healthy = raw.is_up();
        let counter = &mut self.stat.status_counter;
        if counter.max_len != threshold.window() {
            counter.set_max_len(threshold.window());
        }
        counter.append_status(healthy, message.clone());

        let needed = if healthy {
            threshold.success
        } else {
            threshold.failure
        };
        if self.pre_status == Status::Init || counter.status_count >= needed {
            self.status = raw;
        }
        self.message = message;

        let was_healthy = self.pre_status.is_up() || self.pre_status == Status::Init;
        if !self.status.is_up() && was_healthy {
            self.latest_down_time = Some(start);
        }
        if self.status.is_up() && !was_healthy {
            if let Some(down) = self.latest_down_time {
                self.recovery_duration = (start - down).to_std().unwrap_or(Duration::ZERO);
            }
        }

        self.do_stat(period);
        self.stat
            .notification_strategy_data
            .process_status(self.status.is_up());
    }

    /// Count the current status and credit `period` to up or down time.
    pub fn do_stat(&mut self, period: Duration) {
        let stat = &mut self.stat;
        if stat.since.is_none() {
            stat.since = Some(self.start_time);
        }
        stat.total += 1;
        *stat.status.entry(self.status).or_insert(0) += 1;
        if self.status.is_up() {
            stat.up_time += period;
        } else {
            stat.down_time += period;
        }
    }

    /// Take over history from a persisted snapshot of the same prober.
    ///
    /// Identity fields and the configured notification strategy are kept.
    pub fn restore_from(&mut self, saved: &ProbeResult) {
        let strategy = self.stat.notification_strategy_data.strategy;
        let factor = self.stat.notification_strategy_data.factor;
        let max_times = self.stat.notification_strategy_data.max_times;
        let window = self.stat.status_counter.max_len;

        self.start_time = saved.start_time;
        self.start_timestamp = saved.start_timestamp;
        self.round_trip_time = saved.round_trip_time;
        self.status = saved.status;
        self.pre_status = saved.pre_status;
        self.message = saved.message.clone();
        self.latest_down_time = saved.latest_down_time;
        self.recovery_duration = saved.recovery_duration;
        self.stat = saved.stat.clone();
        self.stat.status_counter.set_max_len(window);

        let data = &mut self.stat.notification_strategy_data;
        data.strategy = strategy;
        data.factor = factor;
        data.max_times = max_times;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(60);

    fn round(result: &mut ProbeResult, raw: Status, threshold: Threshold) {
        result.finish_round(
            Utc::now(),
            Duration::from_millis(5),
            raw,
            format!("{}", raw),
            threshold,
            PERIOD,
        );
    }

    #[test]
    fn test_pre_status_tracks_previous_round() {
        let mut r = ProbeResult::new("api", "http://localhost");
        round(&mut r, Status::Up, Threshold::default());
        assert_eq!(r.pre_status, Status::Init);
        assert_eq!(r.status, Status::Up);

        round(&mut r, Status::Down, Threshold::default());
        assert_eq!(r.pre_status, Status::Up);
        assert_eq!(r.status, Status::Down);
        assert!(r.latest_down_time.is_some());

        round(&mut r, Status::Up, Threshold::default());
        assert_eq!(r.pre_status, Status::Down);
        assert_eq!(r.status, Status::Up);
    }

    #[test]
    fn test_stat_totals_match_status_counts() {
        let mut r = ProbeResult::new("db", "tcp://db:5432");
        for raw in [Status::Up, Status::Up, Status::Down, Status::Unknown, Status::Up] {
            round(&mut r, raw, Threshold::default());
        }
        let sum: u64 = r.stat.status.values().sum();
        assert_eq!(sum, r.stat.total);
        assert_eq!(r.stat.total, 5);
        assert_eq!(r.stat.count(Status::Up), 3);
        assert_eq!(r.stat.up_time, PERIOD * 3);
        assert_eq!(r.stat.down_time, PERIOD * 2);
        assert!((r.stat.sla() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_failure_threshold_debounces_flip() {
        let threshold = Threshold {
            success: 1,
            failure: 3,
        };
        let mut r = ProbeResult::new("web", "http://web");
        round(&mut r, Status::Up, threshold);
        round(&mut r, Status::Down, threshold);
        round(&mut r, Status::Down, threshold);
        assert_eq!(r.status, Status::Up);

        round(&mut r, Status::Down, threshold);
        assert_eq!(r.status, Status::Down);
        assert_eq!(r.pre_status, Status::Up);
    }

    #[test]
    fn test_strategy_fed_each_round() {
        let mut r = ProbeResult::new("web", "http://web");
        round(&mut r, Status::Down, Threshold::default());
        assert!(r.stat.notification_strategy_data.need_to_send_notification());
        round(&mut r, Status::Down, Threshold::default());
        assert!(!r.stat.notification_strategy_data.need_to_send_notification());
        round(&mut r, Status::Up, Threshold::default());
        assert_eq!(r.stat.notification_strategy_data.failed, 0);
    }

    #[test]
    fn test_restore_keeps_configured_strategy() {
        let mut saved = ProbeResult::new("web", "http://old");
        round(&mut saved, Status::Down, Threshold::default());
        saved.stat.notification_strategy_data.strategy = Strategy::Regular;

        let mut fresh = ProbeResult::new("web", "http://new");
        fresh.stat.notification_strategy_data =
            NotificationStrategyData::new(Strategy::Exponential, 2, 5);
        fresh.restore_from(&saved);

        assert_eq!(fresh.endpoint, "http://new");
        assert_eq!(fresh.status, Status::Down);
        assert_eq!(fresh.stat.total, 1);
        assert_eq!(fresh.stat.notification_strategy_data.strategy, Strategy::Exponential);
        assert_eq!(fresh.stat.notification_strategy_data.failed, 1);
    }

    #[test]
    fn test_json_roundtrip_keeps_stat() {
        let mut r = ProbeResult::new("web", "http://web");
        round(&mut r, Status::Up, Threshold::default());
        round(&mut r, Status::Down, Threshold::default());

        let json = serde_json::to_string(&r).unwrap();
        let back: ProbeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stat.total, 2);
        assert_eq!(back.stat.count(Status::Down), 1);
        assert_eq!(back.status, Status::Down);
    }
}
