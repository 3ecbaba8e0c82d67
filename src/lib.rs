//! probewatch - health probing and notification fan-out.
//!
//! Probers run on their own schedules and hand each result to the channels
//! they subscribe to. Every channel decides whether the status change is
//! worth telling anyone about and fans the result out to its notifiers.

pub mod channel;
pub mod config;
pub mod db;
pub mod notify;
pub mod probe;
pub mod result;
pub mod scheduler;
pub mod status;

#[cfg(test)]
pub mod test_helpers;
