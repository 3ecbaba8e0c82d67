//! Result persistence.
//!
//! The latest [`ProbeResult`](crate::result::ProbeResult) of every prober is
//! kept in a single JSON file so uptime statistics survive restarts.

mod store;

pub use store::*;
