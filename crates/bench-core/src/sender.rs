use crate::error::{BenchError, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

const BODY_FILLER: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub tag: String,
    /// Lookup keys attached by the producer, opaque to the broker
    pub keys: Option<String>,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(topic: impl Into<String>, tag: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            tag: tag.into(),
            keys: None,
            body: body.into(),
        }
    }

    pub fn with_keys(&self, keys: impl Into<String>) -> Self {
        Self {
            keys: Some(keys.into()),
            ..self.clone()
        }
    }

    /// Message whose body is exactly `size` bytes of filler text.
    pub fn with_body_size(topic: impl Into<String>, tag: impl Into<String>, size: usize) -> Self {
        let body = BODY_FILLER.iter().cycle().take(size).copied().collect::<Vec<u8>>();
        Self::new(topic, tag, body)
    }
}

/// Broker verdict on a send that got a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Ok,
    FlushDiskTimeout,
    FlushSlaveTimeout,
    SlaveNotAvailable,
}

impl SendStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, SendStatus::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub status: SendStatus,
    /// Partition (queue) the message landed in
    pub queue_id: usize,
    pub offset: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    /// The request never left the client
    #[error("send request failed: {0}")]
    Request(String),
    /// The request went out but no usable response came back
    #[error("response failed: {0}")]
    Response(String),
    #[error("gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

pub type SendFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<SendReceipt, SendError>> + Send + 'a>>;

/// Fire-and-measure send capability of a messaging client.
pub trait MessageSender: Send + Sync {
    fn name(&self) -> &'static str;

    fn send<'a>(&'a self, message: &'a Message) -> SendFuture<'a>;
}

/// Key-affine send capability: same key, same partition, in order.
pub trait OrderedSender: Send + Sync {
    fn name(&self) -> &'static str;

    /// Partition count the key is hashed over.
    fn partitions(&self) -> usize;

    fn send_orderly<'a>(
        &'a self,
        message: &'a Message,
        order_key: u64,
        max_retries: u32,
    ) -> SendFuture<'a>;
}

/// Map a partition key onto one of `partitions` queues.
pub fn select_partition(order_key: u64, partitions: usize) -> usize {
    debug_assert!(partitions > 0);
    (order_key % partitions as u64) as usize
}

/// In-process sender with a fixed delay. Every `fail_every`-th call fails
/// before anything is sent.
pub struct MockSender {
    delay: Duration,
    fail_every: Option<u64>,
    calls: AtomicU64,
}

impl MockSender {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_every: None,
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_fail_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl MessageSender for MockSender {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn send<'a>(&'a self, _message: &'a Message) -> SendFuture<'a> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(n) = self.fail_every {
                if call % n == 0 {
                    return Err(SendError::Request(format!("injected failure on call {call}")));
                }
            }

            sleep(self.delay).await;

            Ok(SendReceipt {
                status: SendStatus::Ok,
                queue_id: 0,
                offset: call - 1,
            })
        })
    }
}

/// One message accepted by [`MockOrderedSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Acceptance order across all partitions
    pub seq: u64,
    pub keys: Option<String>,
}

/// In-process ordered sender.
///
/// Each partition keeps the messages it accepted, appended under the
/// partition lock so their order is the delivery order.
pub struct MockOrderedSender {
    delay: Duration,
    partitions: Vec<Mutex<Vec<Delivered>>>,
    transient_failures: AtomicU32,
    next_seq: AtomicU64,
}

impl MockOrderedSender {
    pub fn new(partitions: usize, delay: Duration) -> Result<Self> {
        if partitions == 0 {
            return Err(BenchError::Startup(
                "ordered sender needs at least one partition".into(),
            ));
        }
        Ok(Self {
            delay,
            partitions: (0..partitions).map(|_| Mutex::new(Vec::new())).collect(),
            transient_failures: AtomicU32::new(0),
            next_seq: AtomicU64::new(0),
        })
    }

    /// Fail the next `n` attempts, across all callers, before succeeding again.
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::Relaxed);
        self
    }

    pub fn partition_log(&self, queue_id: usize) -> Vec<Delivered> {
        self.partitions
            .get(queue_id)
            .map(|log| log.lock().clone())
            .unwrap_or_default()
    }

    pub fn total_accepted(&self) -> usize {
        self.partitions.iter().map(|log| log.lock().len()).sum()
    }

    fn take_transient_failure(&self) -> bool {
        self.transient_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl OrderedSender for MockOrderedSender {
    fn name(&self) -> &'static str {
        "mock-ordered"
    }

    fn partitions(&self) -> usize {
        self.partitions.len()
    }

    fn send_orderly<'a>(
        &'a self,
        message: &'a Message,
        order_key: u64,
        max_retries: u32,
    ) -> SendFuture<'a> {
        Box::pin(async move {
            let queue_id = select_partition(order_key, self.partitions.len());
            let mut attempts = 0u32;

            loop {
                attempts += 1;
                sleep(self.delay).await;

                if self.take_transient_failure() {
                    if attempts > max_retries {
                        return Err(SendError::RetriesExhausted { attempts });
                    }
                    continue;
                }

                let mut log = self.partitions[queue_id].lock();
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                log.push(Delivered {
                    seq,
                    keys: message.keys.clone(),
                });
                return Ok(SendReceipt {
                    status: SendStatus::Ok,
                    queue_id,
                    offset: (log.len() - 1) as u64,
                });
            }
        })
    }
}
