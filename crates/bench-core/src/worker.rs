use crate::error::Result;
use crate::sender::{Message, MessageSender};
use crate::stats::StatCounters;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// A set of unordered send loops sharing one set of counters.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` send loops that run until `shutdown` flips to true.
    pub fn spawn(
        count: u32,
        sender: Arc<dyn MessageSender>,
        counters: Arc<StatCounters>,
        message: Message,
        shutdown: watch::Receiver<bool>,
        retry_backoff: Duration,
    ) -> Self {
        let message = Arc::new(message);
        let handles = (0..count)
            .map(|worker_id| {
                let sender = sender.clone();
                let counters = counters.clone();
                let message = message.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    send_loop(worker_id, sender, counters, message, shutdown, retry_backoff).await;
                    info!("exit of produce {}", worker_id);
                })
            })
            .collect();

        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every send loop to return. Returns how many were joined.
    pub async fn drain(self) -> Result<usize> {
        let mut joined = 0;
        for handle in self.handles {
            handle.await?;
            joined += 1;
        }
        Ok(joined)
    }
}

async fn send_loop(
    worker_id: u32,
    sender: Arc<dyn MessageSender>,
    counters: Arc<StatCounters>,
    message: Arc<Message>,
    shutdown: watch::Receiver<bool>,
    retry_backoff: Duration,
) {
    // Stop is only checked between sends; an in-flight send always completes.
    while !*shutdown.borrow() {
        let started = Instant::now();
        let failed = match sender.send(&message).await {
            Ok(receipt) if receipt.status.is_ok() => {
                counters.record_success(started.elapsed().as_millis() as u64);
                false
            }
            Ok(receipt) => {
                counters.record_response_failed();
                warn!(
                    worker_id,
                    topic = %message.topic,
                    tag = %message.tag,
                    status = ?receipt.status,
                    "send message got non-ok status"
                );
                true
            }
            Err(e) => {
                counters.record_send_failed();
                warn!(
                    worker_id,
                    topic = %message.topic,
                    tag = %message.tag,
                    "send message error: {}",
                    e
                );
                true
            }
        };

        // Zero backoff retries at once; a broker that keeps failing turns this
        // into a busy loop. A failed send may never have been pending, so
        // yield to keep timers and the stop signal running on this thread.
        if failed {
            if retry_backoff.is_zero() {
                tokio::task::yield_now().await;
            } else {
                sleep(retry_backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::{MockSender, SendError, SendFuture, SendReceipt, SendStatus};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Cycles through success, non-ok status and request error.
    struct RotatingSender {
        calls: AtomicU64,
    }

    impl MessageSender for RotatingSender {
        fn name(&self) -> &'static str {
            "rotating"
        }

        fn send<'a>(&'a self, _message: &'a Message) -> SendFuture<'a> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::Relaxed);
                sleep(Duration::from_millis(5)).await;
                match call % 3 {
                    0 => Ok(SendReceipt {
                        status: SendStatus::Ok,
                        queue_id: 0,
                        offset: call,
                    }),
                    1 => Ok(SendReceipt {
                        status: SendStatus::FlushDiskTimeout,
                        queue_id: 0,
                        offset: call,
                    }),
                    _ => Err(SendError::Request("connection reset".into())),
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_records_latency_of_successful_sends() {
        let counters = Arc::new(StatCounters::new());
        let sender = Arc::new(MockSender::new(Duration::from_millis(10)));
        let (stop_tx, stop_rx) = watch::channel(false);

        let pool = WorkerPool::spawn(
            3,
            sender.clone(),
            counters.clone(),
            Message::with_body_size("bench", "benchmark-producer", 32),
            stop_rx,
            Duration::ZERO,
        );
        assert_eq!(pool.len(), 3);

        sleep(Duration::from_millis(1_005)).await;
        stop_tx.send(true).unwrap();
        assert_eq!(pool.drain().await.unwrap(), 3);

        let values = counters.load();
        assert!(values.receive_response_success_count > 0);
        assert_eq!(values.receive_response_success_count, sender.calls());
        assert_eq!(
            values.send_request_success_count,
            values.receive_response_success_count
        );
        assert_eq!(values.send_message_max_rt, 10);
        assert_eq!(
            values.send_message_success_time_total,
            10 * values.receive_response_success_count
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_classified_and_loop_continues() {
        let counters = Arc::new(StatCounters::new());
        let sender = Arc::new(RotatingSender {
            calls: AtomicU64::new(0),
        });
        let (stop_tx, stop_rx) = watch::channel(false);

        let pool = WorkerPool::spawn(
            1,
            sender.clone(),
            counters.clone(),
            Message::with_body_size("bench", "benchmark-producer", 16),
            stop_rx,
            Duration::ZERO,
        );

        // 30 sends of 5ms each fit before 152ms
        sleep(Duration::from_millis(152)).await;
        stop_tx.send(true).unwrap();
        pool.drain().await.unwrap();

        let values = counters.load();
        let calls = sender.calls.load(Ordering::Relaxed);
        assert_eq!(calls, 31);
        assert_eq!(
            values.receive_response_success_count
                + values.receive_response_failed_count
                + values.send_request_failed_count,
            calls
        );
        assert_eq!(values.receive_response_success_count, 11);
        assert_eq!(values.receive_response_failed_count, 10);
        assert_eq!(values.send_request_failed_count, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_throttles_failures() {
        let counters = Arc::new(StatCounters::new());
        let sender = Arc::new(MockSender::new(Duration::ZERO).with_fail_every(1));
        let (stop_tx, stop_rx) = watch::channel(false);

        let pool = WorkerPool::spawn(
            1,
            sender.clone(),
            counters.clone(),
            Message::with_body_size("bench", "benchmark-producer", 16),
            stop_rx,
            Duration::from_millis(100),
        );

        sleep(Duration::from_millis(450)).await;
        stop_tx.send(true).unwrap();
        pool.drain().await.unwrap();

        assert_eq!(counters.load().send_request_failed_count, 5);
        assert_eq!(counters.load().receive_response_success_count, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_immediate_failures_do_not_starve_runtime() {
        // more failing loops than runtime threads
        let counters = Arc::new(StatCounters::new());
        let sender = Arc::new(MockSender::new(Duration::ZERO).with_fail_every(1));
        let (stop_tx, stop_rx) = watch::channel(false);

        let pool = WorkerPool::spawn(
            4,
            sender.clone(),
            counters.clone(),
            Message::with_body_size("bench", "benchmark-producer", 8),
            stop_rx,
            Duration::ZERO,
        );

        let stopped = tokio::time::timeout(Duration::from_secs(5), async move {
            sleep(Duration::from_millis(100)).await;
            stop_tx.send(true).unwrap();
            pool.drain().await.unwrap()
        })
        .await;

        assert_eq!(stopped.expect("timer starved by failing send loops"), 4);
        assert!(counters.load().send_request_failed_count > 0);
        assert_eq!(counters.load().receive_response_success_count, 0);
    }

    #[tokio::test]
    async fn test_stop_before_start_sends_nothing() {
        let counters = Arc::new(StatCounters::new());
        let sender = Arc::new(MockSender::new(Duration::from_millis(1)));
        let (_stop_tx, stop_rx) = watch::channel(true);

        let pool = WorkerPool::spawn(
            4,
            sender.clone(),
            counters.clone(),
            Message::with_body_size("bench", "benchmark-producer", 8),
            stop_rx,
            Duration::ZERO,
        );
        assert_eq!(pool.drain().await.unwrap(), 4);
        assert_eq!(sender.calls(), 0);
        assert_eq!(counters.load(), Default::default());
    }
}
