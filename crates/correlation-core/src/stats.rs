//! Correlation counters
//!
//! Updated with relaxed atomics from every worker; a snapshot is a
//! consistent-enough view for periodic reporting, not an exact cut.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct CorrelationStats {
    pub(crate) sdp_cached: AtomicU64,
    pub(crate) sdp_rejected: AtomicU64,
    pub(crate) rtcp_correlated: AtomicU64,
    pub(crate) rtcp_promoted: AtomicU64,
    pub(crate) rtcp_uncorrelated: AtomicU64,
    pub(crate) rtcp_skipped: AtomicU64,
    pub(crate) log_identifier: AtomicU64,
    pub(crate) log_severity: AtomicU64,
    pub(crate) log_unmatched: AtomicU64,
    pub(crate) ng_correlated: AtomicU64,
    pub(crate) ng_uncorrelated: AtomicU64,
    pub(crate) ng_skipped: AtomicU64,
}

/// Plain copy of [`CorrelationStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub sdp_cached: u64,
    pub sdp_rejected: u64,
    pub rtcp_correlated: u64,
    /// SSRC cache entries written after an address/port hit
    pub rtcp_promoted: u64,
    pub rtcp_uncorrelated: u64,
    pub rtcp_skipped: u64,
    pub log_identifier: u64,
    pub log_severity: u64,
    pub log_unmatched: u64,
    pub ng_correlated: u64,
    pub ng_uncorrelated: u64,
    pub ng_skipped: u64,
}

impl CorrelationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            sdp_cached: load(&self.sdp_cached),
            sdp_rejected: load(&self.sdp_rejected),
            rtcp_correlated: load(&self.rtcp_correlated),
            rtcp_promoted: load(&self.rtcp_promoted),
            rtcp_uncorrelated: load(&self.rtcp_uncorrelated),
            rtcp_skipped: load(&self.rtcp_skipped),
            log_identifier: load(&self.log_identifier),
            log_severity: load(&self.log_severity),
            log_unmatched: load(&self.log_unmatched),
            ng_correlated: load(&self.ng_correlated),
            ng_uncorrelated: load(&self.ng_uncorrelated),
            ng_skipped: load(&self.ng_skipped),
        }
    }
}
