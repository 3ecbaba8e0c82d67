//! Probe status values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The status of a prober after its most recent round.
///
/// The ordering only exists so statuses can be kept in sorted maps for
/// display; transition logic relies on equality alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Init,
    Up,
    Down,
    Unknown,
    /// The prober failed to configure and is never scheduled.
    Bad,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Init,
        Status::Up,
        Status::Down,
        Status::Unknown,
        Status::Bad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Init => "init",
            Status::Up => "up",
            Status::Down => "down",
            Status::Unknown => "unknown",
            Status::Bad => "bad",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Status::Init => "🔎",
            Status::Up => "✅",
            Status::Down => "❌",
            Status::Unknown => "⛔️",
            Status::Bad => "🚫",
        }
    }

    pub fn is_up(&self) -> bool {
        *self == Status::Up
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Down).unwrap(), "\"down\"");
        let s: Status = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(s, Status::Unknown);
    }

    #[test]
    fn test_every_status_has_a_wire_name() {
        for status in Status::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert!(!status.emoji().is_empty());
        }
        assert_eq!(Status::ALL.iter().filter(|s| s.is_up()).count(), 1);
    }

    #[test]
    fn test_default_is_init() {
        assert_eq!(Status::default(), Status::Init);
        assert_eq!(Status::Bad.to_string(), "bad");
    }
}
