use crate::config::{OrderedConfig, TargetConfig};
use crate::error::Result;
use crate::sender::{Message, OrderedSender};
use crate::stats::StatCounters;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const ORDERED_TAG: &str = "order-producer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedSummary {
    /// Messages taken off the countdown and handed to the sender
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub elapsed: Duration,
}

/// Drains a fixed message budget through `worker_count` workers, every
/// message carrying the same partition key.
pub struct OrderedDispatcher {
    target: TargetConfig,
    ordered: OrderedConfig,
    counters: Arc<StatCounters>,
}

impl OrderedDispatcher {
    pub fn new(target: TargetConfig, ordered: OrderedConfig) -> Self {
        Self {
            target,
            ordered,
            counters: Arc::new(StatCounters::new()),
        }
    }

    pub fn counters(&self) -> &Arc<StatCounters> {
        &self.counters
    }

    pub async fn run(&self, sender: Arc<dyn OrderedSender>) -> Result<OrderedSummary> {
        self.target.validate()?;
        self.ordered.validate()?;

        let started = Instant::now();
        let remaining = Arc::new(AtomicI64::new(
            i64::try_from(self.ordered.message_count).unwrap_or(i64::MAX),
        ));
        let dispatched = Arc::new(AtomicU64::new(0));
        let message = Arc::new(Message::new(
            self.target.topic.clone(),
            ORDERED_TAG,
            self.ordered.body.clone(),
        ));

        info!(
            workers = self.ordered.worker_count,
            messages = self.ordered.message_count,
            order_key = self.ordered.order_key,
            partitions = sender.partitions(),
            "starting ordered dispatch via {}",
            sender.name()
        );

        let mut handles = Vec::with_capacity(self.ordered.worker_count as usize);
        for worker_id in 0..self.ordered.worker_count {
            let worker = OrderedWorker {
                worker_id,
                sender: sender.clone(),
                counters: self.counters.clone(),
                remaining: remaining.clone(),
                dispatched: dispatched.clone(),
                message: message.clone(),
                order_key: self.ordered.order_key,
                max_retries: self.ordered.max_retries,
            };
            handles.push(tokio::spawn(worker.run()));
        }

        for h in handles {
            h.await?;
        }

        let values = self.counters.load();
        Ok(OrderedSummary {
            dispatched: dispatched.load(Ordering::Relaxed),
            succeeded: values.receive_response_success_count,
            failed: values.send_request_failed_count + values.receive_response_failed_count,
            elapsed: started.elapsed(),
        })
    }
}

struct OrderedWorker {
    worker_id: u32,
    sender: Arc<dyn OrderedSender>,
    counters: Arc<StatCounters>,
    remaining: Arc<AtomicI64>,
    dispatched: Arc<AtomicU64>,
    message: Arc<Message>,
    order_key: u64,
    max_retries: u32,
}

impl OrderedWorker {
    async fn run(self) {
        // Post-decrement value must stay non-negative, so the budget is
        // consumed exactly once across all workers. Each message is keyed
        // `<worker>-<dispatch index>`.
        loop {
            let left = self.remaining.fetch_sub(1, Ordering::AcqRel) - 1;
            if left < 0 {
                break;
            }
            let index = self.dispatched.fetch_add(1, Ordering::Relaxed);
            let message = self
                .message
                .with_keys(format!("{}-{}", self.worker_id, index));
            let started = Instant::now();

            match self
                .sender
                .send_orderly(&message, self.order_key, self.max_retries)
                .await
            {
                Ok(receipt) if receipt.status.is_ok() => {
                    self.counters
                        .record_success(started.elapsed().as_millis() as u64);
                    debug!(worker_id = self.worker_id, ?receipt, "send result");
                }
                Ok(receipt) => {
                    self.counters.record_response_failed();
                    warn!(worker_id = self.worker_id, ?receipt, "send result not ok");
                }
                Err(e) => {
                    self.counters.record_send_failed();
                    warn!(worker_id = self.worker_id, "ordered send failed: {}", e);
                }
            }
        }
    }
}
