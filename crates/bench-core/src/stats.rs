use std::sync::atomic::{AtomicU64, Ordering};

/// Run-wide counters updated by every send loop.
///
/// Only atomic adds and compare-and-swap touch these fields, so the hot
/// path never blocks. Every counter is monotonically non-decreasing.
#[derive(Debug, Default)]
pub struct StatCounters {
    send_request_success_count: AtomicU64,
    send_request_failed_count: AtomicU64,
    receive_response_success_count: AtomicU64,
    receive_response_failed_count: AtomicU64,
    send_message_success_time_total: AtomicU64,
    send_message_max_rt: AtomicU64,
}

impl StatCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful round trip of `latency_ms`.
    pub fn record_success(&self, latency_ms: u64) {
        self.receive_response_success_count
            .fetch_add(1, Ordering::Relaxed);
        self.send_request_success_count
            .fetch_add(1, Ordering::Relaxed);
        self.send_message_success_time_total
            .fetch_add(latency_ms, Ordering::Relaxed);
        self.record_max_rt(latency_ms);
    }

    /// The request never reached the broker.
    pub fn record_send_failed(&self) {
        self.send_request_failed_count
            .fetch_add(1, Ordering::Relaxed);
    }

    /// The request went out but the broker did not acknowledge it.
    pub fn record_response_failed(&self) {
        self.receive_response_failed_count
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Raise the stored maximum to `latency_ms` if it is larger.
    pub fn record_max_rt(&self, latency_ms: u64) {
        let mut current = self.send_message_max_rt.load(Ordering::Relaxed);
        while latency_ms > current {
            match self.send_message_max_rt.compare_exchange(
                current,
                latency_ms,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn max_rt(&self) -> u64 {
        self.send_message_max_rt.load(Ordering::Relaxed)
    }

    /// Read all six counters.
    ///
    /// Each field is loaded on its own, so under concurrent writers the
    /// result can mix values from slightly different moments.
    pub fn load(&self) -> CounterValues {
        CounterValues {
            send_request_success_count: self.send_request_success_count.load(Ordering::Relaxed),
            send_request_failed_count: self.send_request_failed_count.load(Ordering::Relaxed),
            receive_response_success_count: self
                .receive_response_success_count
                .load(Ordering::Relaxed),
            receive_response_failed_count: self
                .receive_response_failed_count
                .load(Ordering::Relaxed),
            send_message_success_time_total: self
                .send_message_success_time_total
                .load(Ordering::Relaxed),
            send_message_max_rt: self.send_message_max_rt.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`StatCounters`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterValues {
    pub send_request_success_count: u64,
    pub send_request_failed_count: u64,
    pub receive_response_success_count: u64,
    pub receive_response_failed_count: u64,
    pub send_message_success_time_total: u64,
    pub send_message_max_rt: u64,
}
