use crate::config::Config;
use crate::error::Result;
use crate::report::{run_report_task, run_snapshot_task, WindowReport};
use crate::sender::{Message, MessageSender};
use crate::snapshot::SnapshotRing;
use crate::stats::{CounterValues, StatCounters};
use crate::worker::WorkerPool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::info;

const BENCHMARK_TAG: &str = "benchmark-producer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Idle,
    Running,
    Draining,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Deadline,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    /// None when the run was too short to fill a report window
    pub final_report: Option<WindowReport>,
    pub totals: CounterValues,
    pub workers_joined: usize,
    pub elapsed: Duration,
}

/// Drives one time-boxed benchmark run from start to final report.
pub struct BenchmarkController {
    config: Config,
    counters: Arc<StatCounters>,
    snapshots: Arc<SnapshotRing>,
    phase: watch::Sender<Phase>,
}

impl BenchmarkController {
    pub fn new(config: Config) -> Self {
        let counters = Arc::new(StatCounters::new());
        let snapshots = Arc::new(SnapshotRing::new(counters.clone()));
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            config,
            counters,
            snapshots,
            phase,
        }
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn counters(&self) -> &Arc<StatCounters> {
        &self.counters
    }

    /// Run until the configured deadline or `interrupt` resolves, whichever
    /// comes first, then drain every task and produce the final report.
    pub async fn run<F>(self, sender: Arc<dyn MessageSender>, interrupt: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        self.config.validate_producer()?;

        let producer = &self.config.producer;
        let report = &self.config.report;
        let started = Instant::now();
        let (stop_tx, stop_rx) = watch::channel(false);

        info!(
            topic = %self.config.target.topic,
            name_server = %self.config.target.name_server,
            group_id = %self.config.target.group_id,
            instances = producer.instance_count,
            body_size = producer.body_size,
            duration_ms = producer.duration_ms,
            "starting benchmark via {}",
            sender.name()
        );

        let pool = WorkerPool::spawn(
            producer.instance_count,
            sender,
            self.counters.clone(),
            Message::with_body_size(
                self.config.target.topic.clone(),
                BENCHMARK_TAG,
                producer.body_size,
            ),
            stop_rx.clone(),
            producer.retry_backoff(),
        );
        let snapshot_task = tokio::spawn(run_snapshot_task(
            self.snapshots.clone(),
            report.snapshot_interval(),
            stop_rx.clone(),
        ));
        let report_task = tokio::spawn(run_report_task(
            self.snapshots.clone(),
            report.report_interval(),
            stop_rx,
        ));
        self.set_phase(Phase::Running);

        let stop_reason = tokio::select! {
            _ = sleep(producer.duration()) => StopReason::Deadline,
            _ = interrupt => StopReason::Interrupted,
        };

        self.set_phase(Phase::Draining);
        info!(?stop_reason, "stopping workers");
        // Err only means every task already exited
        let _ = stop_tx.send(true);

        let workers_joined = pool.drain().await?;
        snapshot_task.await?;
        let reports_printed = report_task.await?;

        self.snapshots.take_snapshot();
        let final_report = self.snapshots.window_report();
        if let Some(report) = &final_report {
            println!("{report}");
        }
        self.set_phase(Phase::Done);
        println!("TEST DONE");

        let summary = RunSummary {
            stop_reason,
            final_report,
            totals: self.counters.load(),
            workers_joined,
            elapsed: started.elapsed(),
        };
        info!(
            workers_joined,
            reports_printed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "benchmark finished"
        );
        Ok(summary)
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.send_replace(phase);
        info!(?phase, "benchmark phase");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProducerConfig, ReportConfig, TargetConfig};
    use crate::error::BenchError;
    use crate::sender::MockSender;
    use std::future::pending;
    use tokio::sync::oneshot;

    fn test_config(duration_ms: u64) -> Config {
        Config {
            target: TargetConfig {
                name_server: "127.0.0.1:9876".into(),
                topic: "bench".into(),
                group_id: "bench-group".into(),
            },
            producer: ProducerConfig {
                instance_count: 3,
                duration_ms,
                body_size: 32,
                retry_backoff_ms: 0,
            },
            report: ReportConfig {
                snapshot_interval_ms: 100,
                report_interval_ms: 1_000,
            },
            ..Config::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_drains_then_reports() {
        let controller = BenchmarkController::new(test_config(2_000));
        let mut phases = controller.subscribe_phase();
        let sender = Arc::new(MockSender::new(Duration::from_millis(10)));

        let watcher = tokio::spawn(async move {
            let mut seen = vec![*phases.borrow_and_update()];
            while phases.changed().await.is_ok() {
                seen.push(*phases.borrow_and_update());
                if seen.last() == Some(&Phase::Done) {
                    break;
                }
            }
            seen
        });
        tokio::task::yield_now().await;

        let start = Instant::now();
        let summary = controller.run(sender.clone(), pending()).await.unwrap();

        assert_eq!(summary.stop_reason, StopReason::Deadline);
        assert_eq!(summary.workers_joined, 3);
        // in-flight sends finish within one 10ms send after the deadline
        assert!(start.elapsed() <= Duration::from_millis(2_010));
        assert_eq!(summary.totals.receive_response_success_count, sender.calls());
        assert_eq!(summary.totals.send_message_max_rt, 10);

        let report = summary.final_report.expect("2s at 100ms cadence fills the window");
        assert!(report.has_successes());
        assert_eq!(report.max_rt, 10);
        assert!(report.send_tps > 0.0);

        // watch keeps only the latest value, so quick transitions may merge
        let seen = watcher.await.unwrap();
        assert_eq!(seen.first(), Some(&Phase::Idle));
        assert!(seen.contains(&Phase::Running));
        assert_eq!(seen.last(), Some(&Phase::Done));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_stops_before_deadline() {
        let controller = BenchmarkController::new(test_config(60_000));
        let sender = Arc::new(MockSender::new(Duration::from_millis(5)));
        let (interrupt_tx, interrupt_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            let _ = interrupt_tx.send(());
        });

        let start = Instant::now();
        let summary = controller
            .run(sender, async {
                let _ = interrupt_rx.await;
            })
            .await
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::Interrupted);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(summary.workers_joined, 3);
        // only 5 snapshots fit in 500ms plus the final one
        assert!(summary.final_report.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_fires_while_every_send_fails() {
        let mut config = test_config(200);
        config.producer.instance_count = 4;
        let controller = BenchmarkController::new(config);
        let phases = controller.subscribe_phase();
        let sender = Arc::new(MockSender::new(Duration::ZERO).with_fail_every(1));

        let summary = tokio::time::timeout(
            Duration::from_secs(10),
            controller.run(sender, pending()),
        )
        .await
        .expect("controller never reached Done")
        .unwrap();

        assert_eq!(summary.stop_reason, StopReason::Deadline);
        assert_eq!(summary.workers_joined, 4);
        assert!(summary.totals.send_request_failed_count > 0);
        assert_eq!(summary.totals.receive_response_success_count, 0);
        assert_eq!(*phases.borrow(), Phase::Done);
    }

    #[tokio::test]
    async fn test_invalid_config_starts_nothing() {
        let mut config = test_config(1_000);
        config.producer.instance_count = 0;
        let controller = BenchmarkController::new(config);
        let phases = controller.subscribe_phase();
        let sender = Arc::new(MockSender::new(Duration::ZERO));

        let err = controller.run(sender.clone(), pending()).await.unwrap_err();

        assert!(matches!(err, BenchError::Config(_)));
        assert_eq!(sender.calls(), 0);
        assert_eq!(*phases.borrow(), Phase::Idle);
    }
}
