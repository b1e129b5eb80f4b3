use crate::snapshot::{Snapshot, SnapshotRing};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Moving-window view of the run, derived from two snapshots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReport {
    pub send_tps: f64,
    pub max_rt: u64,
    /// NaN when the window saw no successful responses.
    pub avg_rt: f64,
    pub send_failed: u64,
    pub response_failed: u64,
    pub total: u64,
}

impl WindowReport {
    pub fn between(first: &Snapshot, last: &Snapshot, max_rt: u64) -> Self {
        let resp_suc_count = last
            .values
            .receive_response_success_count
            .saturating_sub(first.values.receive_response_success_count)
            as f64;
        let elapsed = last
            .taken_at
            .saturating_duration_since(first.taken_at)
            .as_secs_f64();
        let time_total = last
            .values
            .send_message_success_time_total
            .saturating_sub(first.values.send_message_success_time_total)
            as f64;

        Self {
            send_tps: resp_suc_count / elapsed,
            max_rt,
            avg_rt: time_total / resp_suc_count,
            send_failed: last.values.send_request_failed_count,
            response_failed: last.values.receive_response_failed_count,
            total: last.values.receive_response_success_count,
        }
    }

    /// False when no response succeeded inside the window.
    pub fn has_successes(&self) -> bool {
        self.avg_rt.is_finite()
    }
}

impl fmt::Display for WindowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `as` saturates, so an empty elapsed span cannot panic here
        write!(
            f,
            "Send TPS: {} Max RT: {} Average RT: {:7.3} Send Failed: {} Response Failed: {} Total:{}",
            self.send_tps as i64,
            self.max_rt,
            self.avg_rt,
            self.send_failed,
            self.response_failed,
            self.total
        )
    }
}

/// Snapshot the counters every `period` until `shutdown` flips.
pub async fn run_snapshot_task(
    ring: Arc<SnapshotRing>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => ring.take_snapshot(),
            _ = stopped(&mut shutdown) => break,
        }
    }
    debug!("snapshot task stopped");
}

/// Print the window report every `period` until `shutdown` flips.
///
/// Returns how many lines were printed.
pub async fn run_report_task(
    ring: Arc<SnapshotRing>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut printed = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(report) = ring.window_report() {
                    println!("{report}");
                    printed += 1;
                }
            }
            _ = stopped(&mut shutdown) => break,
        }
    }
    debug!(printed, "report task stopped");
    printed
}

/// Resolves once the stop flag is set or its sender is gone.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // a dropped sender ends the run as well
    let _ = shutdown.wait_for(|stop| *stop).await;
}
