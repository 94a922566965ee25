// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transaction core counters.
//!
//! Cheap process-wide counters covering the visible behaviour of the core:
//! requests in, responses out by class, loop rejections, CANCEL matching
//! and application failures. [`CoreMetrics`] is `Clone` and shared between
//! the router and every call actor; [`snapshot`](CoreMetrics::snapshot)
//! returns a consistent copy.

use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Debug, Default, Clone)]
struct Counters {
    requests: u64,
    responses_by_class: [u64; 6],
    retransmissions: u64,
    loops_detected: u64,
    cancels_matched: u64,
    cancels_unmatched: u64,
    app_timeouts: u64,
    app_errors: u64,
    transactions_created: u64,
    transactions_finished: u64,
    calls_started: u64,
    calls_finished: u64,
}

/// Shared counter handle.
#[derive(Debug, Default, Clone)]
pub struct CoreMetrics {
    inner: Arc<RwLock<Counters>>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    /// Responses indexed by class: `[0]` = 1xx … `[5]` = 6xx.
    pub responses_by_class: [u64; 6],
    pub retransmissions: u64,
    pub loops_detected: u64,
    pub cancels_matched: u64,
    pub cancels_unmatched: u64,
    pub app_timeouts: u64,
    pub app_errors: u64,
    pub transactions_created: u64,
    pub transactions_finished: u64,
    pub calls_started: u64,
    pub calls_finished: u64,
}

impl MetricsSnapshot {
    /// Total number of responses sent.
    pub fn responses(&self) -> u64 {
        self.responses_by_class.iter().sum()
    }

    /// Number of final (>= 200) responses sent.
    pub fn final_responses(&self) -> u64 {
        self.responses_by_class[1..].iter().sum()
    }
}

impl CoreMetrics {
    /// Creates a fresh counter set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.inner.write().requests += 1;
    }

    pub fn record_response(&self, code: u16) {
        let class = (code / 100).clamp(1, 6) as usize - 1;
        self.inner.write().responses_by_class[class] += 1;
    }

    pub fn record_retransmission(&self) {
        self.inner.write().retransmissions += 1;
    }

    pub fn record_loop_detected(&self) {
        self.inner.write().loops_detected += 1;
    }

    pub fn record_cancel(&self, matched: bool) {
        let mut counters = self.inner.write();
        if matched {
            counters.cancels_matched += 1;
        } else {
            counters.cancels_unmatched += 1;
        }
    }

    pub fn record_app_timeout(&self) {
        self.inner.write().app_timeouts += 1;
    }

    pub fn record_app_error(&self) {
        self.inner.write().app_errors += 1;
    }

    pub fn record_tx_created(&self) {
        self.inner.write().transactions_created += 1;
    }

    pub fn record_tx_finished(&self) {
        self.inner.write().transactions_finished += 1;
    }

    pub fn record_call_started(&self) {
        self.inner.write().calls_started += 1;
    }

    pub fn record_call_finished(&self) {
        self.inner.write().calls_finished += 1;
    }

    /// Returns a consistent copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.inner.read().clone();
        MetricsSnapshot {
            requests: counters.requests,
            responses_by_class: counters.responses_by_class,
            retransmissions: counters.retransmissions,
            loops_detected: counters.loops_detected,
            cancels_matched: counters.cancels_matched,
            cancels_unmatched: counters.cancels_unmatched,
            app_timeouts: counters.app_timeouts,
            app_errors: counters.app_errors,
            transactions_created: counters.transactions_created,
            transactions_finished: counters.transactions_finished,
            calls_started: counters.calls_started,
            calls_finished: counters.calls_finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_are_grouped_by_class() {
        let metrics = CoreMetrics::new();
        metrics.record_response(100);
        metrics.record_response(180);
        metrics.record_response(200);
        metrics.record_response(487);
        metrics.record_response(503);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.responses_by_class[0], 2);
        assert_eq!(snapshot.responses_by_class[1], 1);
        assert_eq!(snapshot.responses_by_class[3], 1);
        assert_eq!(snapshot.responses_by_class[4], 1);
        assert_eq!(snapshot.responses(), 5);
        assert_eq!(snapshot.final_responses(), 3);
    }

    #[test]
    fn clones_share_counters() {
        let metrics = CoreMetrics::new();
        let clone = metrics.clone();
        clone.record_request();
        assert_eq!(metrics.snapshot().requests, 1);
    }
}
