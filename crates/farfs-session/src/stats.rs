//! Session counters.
//!
//! Cheap atomic counters recording what the demux loop has seen. Tests use
//! them to prove properties like "this operation made no round trip" and
//! "the stray response was noticed"; they are also handy in a debugger.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a session.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub(crate) requests_sent: AtomicU64,
    pub(crate) responses_received: AtomicU64,
    pub(crate) unknown_responses: AtomicU64,
    pub(crate) requests_dispatched: AtomicU64,
}

impl SessionStats {
    /// Take a point-in-time snapshot.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            responses_received: self.responses_received.load(Ordering::Relaxed),
            unknown_responses: self.unknown_responses.load(Ordering::Relaxed),
            requests_dispatched: self.requests_dispatched.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of a session's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Requests this session has sent.
    pub requests_sent: u64,
    /// Responses the demux loop has received, matched or not.
    pub responses_received: u64,
    /// Responses whose id had no pending call (already resolved, already
    /// timed out, or foreign).
    pub unknown_responses: u64,
    /// Requests handed to the dispatcher.
    pub requests_dispatched: u64,
}
