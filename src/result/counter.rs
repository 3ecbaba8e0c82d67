//! Sliding window of recent raw probe outcomes.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One raw check outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: bool,
    pub message: String,
}

/// Bounded history of raw outcomes plus the length of the current run of
/// identical outcomes. Used to debounce status flips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounter {
    pub status_history: VecDeque<StatusRecord>,
    pub max_len: usize,
    pub current_status: bool,
    pub status_count: usize,
}

impl Default for StatusCounter {
    fn default() -> Self {
        Self::new(1)
    }
}

impl StatusCounter {
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            status_history: VecDeque::with_capacity(max_len),
            max_len,
            current_status: false,
            status_count: 0,
        }
    }

    /// Record a raw outcome, evicting the oldest once the window is full.
    pub fn append_status(&mut self, status: bool, message: impl Into<String>) {
        if status != self.current_status {
            self.current_status = status;
            self.status_count = 0;
        }
        if self.status_count < self.max_len {
            self.status_count += 1;
        }

        self.status_history.push_back(StatusRecord {
            status,
            message: message.into(),
        });
        while self.status_history.len() > self.max_len {
            self.status_history.pop_front();
        }
    }

    /// Change the window size, keeping the most recent records.
    pub fn set_max_len(&mut self, max_len: usize) {
        self.max_len = max_len.max(1);
        while self.status_history.len() > self.max_len {
            self.status_history.pop_front();
        }
        self.status_count = self.status_count.min(self.max_len);
    }
}
