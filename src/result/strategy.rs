//! Notification strategy: decides on which failed rounds an alert is sent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the gap between repeated failure alerts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Strategy {
    /// Constant gap of `factor` failed rounds.
    #[default]
    Regular,
    /// Gap grows by `factor` after every alert.
    Increment,
    /// Gap is `failed * factor`.
    Exponential,
    /// Anything unrecognized; alerts on every failed round.
    Unknown,
}

impl From<String> for Strategy {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "regular" => Strategy::Regular,
            "increment" => Strategy::Increment,
            "exponent" | "exponential" => Strategy::Exponential,
            _ => Strategy::Unknown,
        }
    }
}

impl From<Strategy> for String {
    fn from(s: Strategy) -> Self {
        s.to_string()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Regular => "regular",
            Strategy::Increment => "increment",
            Strategy::Exponential => "exponential",
            Strategy::Unknown => "unknown",
        })
    }
}

/// Flood-control state carried inside a prober's statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStrategyData {
    pub strategy: Strategy,
    pub factor: u32,
    pub max_times: u32,
    pub notified: u32,
    pub failed: u32,
    pub next: u32,
    pub interval: u32,
    /// Only valid right after `process_status`.
    #[serde(skip)]
    pub is_sent: bool,
}

impl Default for NotificationStrategyData {
    fn default() -> Self {
        Self::new(Strategy::Regular, 1, 1)
    }
}

impl NotificationStrategyData {
    /// Create a fresh state. A factor below one is raised to one.
    pub fn new(strategy: Strategy, factor: u32, max_times: u32) -> Self {
        Self {
            strategy,
            factor: factor.max(1),
            max_times,
            notified: 0,
            failed: 0,
            next: 1,
            interval: 0,
            is_sent: false,
        }
    }

    /// Clear the failure streak.
    pub fn reset(&mut self) {
        self.failed = 0;
        self.notified = 0;
        self.next = 1;
        self.interval = 0;
        self.is_sent = false;
    }

    /// Feed one probe outcome (`true` = healthy).
    pub fn process_status(&mut self, status: bool) {
        if status {
            self.reset();
            return;
        }

        self.failed = self.failed.saturating_add(1);
        if self.failed < self.next {
            self.is_sent = false;
            return;
        }

        self.notified = self.notified.saturating_add(1);
        if self.notified > self.max_times {
            self.is_sent = false;
            return;
        }

        self.interval = self.next_interval();
        self.next = self.failed.saturating_add(self.interval);
        self.is_sent = true;
    }

    /// Whether the last `process_status` call decided to alert.
    pub fn need_to_send_notification(&self) -> bool {
        self.is_sent
    }

    fn next_interval(&self) -> u32 {
        match self.strategy {
            Strategy::Regular => self.factor,
            Strategy::Increment => self.interval.saturating_add(self.factor),
            Strategy::Exponential => self.failed.saturating_mul(self.factor),
            Strategy::Unknown => 1,
        }
    }
}
