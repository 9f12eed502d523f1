//! In-memory implementation of the EventBus trait for testing and development

use crate::delivery::{Acker, Delivery};
use crate::{matches_pattern, BusMessage, BusResult, EventBus, RedeliveryPolicy};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// EventBus implementation using in-memory channels
///
/// Fan-out subscribers share one broadcast channel. Each consumer group
/// owns an unbounded queue; all members of the group pull from that
/// queue, so a message goes to exactly one of them. The queue outlives its
/// members, which gives "deferred until a member joins" semantics.
///
/// # Example
/// ```rust
/// use event_bus::{EventBus, InMemoryBus};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
///
/// // Subscribe before publishing
/// let mut stream = bus.subscribe("vision.>").await?;
///
/// bus.publish("vision.detection.created", b"hello".to_vec()).await?;
///
/// let msg = stream.next().await.unwrap();
/// assert_eq!(msg.subject, "vision.detection.created");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    sender: Arc<broadcast::Sender<BusMessage>>,
    groups: Arc<Mutex<HashMap<(String, String), Arc<GroupQueue>>>>,
}

struct Queued {
    message: BusMessage,
    attempt: u32,
}

struct GroupQueue {
    subject: String,
    tx: mpsc::UnboundedSender<Queued>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Queued>>,
}

impl GroupQueue {
    fn new(subject: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            subject: subject.to_string(),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    fn enqueue(&self, message: BusMessage, attempt: u32) {
        // The queue holds its own receiver, so send only fails once the bus is gone.
        let _ = self.tx.send(Queued { message, attempt });
    }
}

struct InMemoryAcker {
    queue: Arc<GroupQueue>,
    message: BusMessage,
    attempt: u32,
}

#[async_trait]
impl Acker for InMemoryAcker {
    async fn ack(self: Box<Self>) -> BusResult<()> {
        Ok(())
    }

    async fn nak(self: Box<Self>, delay: Duration) -> BusResult<()> {
        let InMemoryAcker {
            queue,
            message,
            attempt,
        } = *self;

        if delay.is_zero() {
            queue.enqueue(message, attempt + 1);
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                queue.enqueue(message, attempt + 1);
            });
        }
        Ok(())
    }

    async fn term(self: Box<Self>) -> BusResult<()> {
        Ok(())
    }
}

impl InMemoryBus {
    /// Create a new in-memory event bus
    ///
    /// Fan-out subscribers share a broadcast buffer of 1000 messages; slow
    /// subscribers past that lose the oldest ones. Consumer-group queues are
    /// unbounded.
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    /// Create a new in-memory event bus with a custom fan-out buffer size
    pub fn with_capacity(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self {
            sender: Arc::new(sender),
            groups: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn group_queue(&self, subject: &str, group: &str) -> Arc<GroupQueue> {
        let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        groups
            .entry((subject.to_string(), group.to_string()))
            .or_insert_with(|| Arc::new(GroupQueue::new(subject)))
            .clone()
    }

    fn matching_queues(&self, subject: &str) -> Vec<Arc<GroupQueue>> {
        let groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        groups
            .values()
            .filter(|q| matches_pattern(subject, &q.subject))
            .cloned()
            .collect()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        let msg = BusMessage::new(subject.to_string(), payload);

        for queue in self.matching_queues(subject) {
            queue.enqueue(msg.clone(), 1);
        }

        // No fan-out receivers is fine
        let _ = self.sender.send(msg);

        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        let mut receiver = self.sender.subscribe();
        let pattern = pattern.to_string();

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(msg) => {
                        if matches_pattern(&msg.subject, &pattern) {
                            yield msg;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(pattern = %pattern, skipped, "InMemoryBus subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(stream.boxed())
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        group: &str,
        _policy: &RedeliveryPolicy,
    ) -> BusResult<BoxStream<'static, Delivery>> {
        let queue = self.group_queue(subject, group);

        let stream = async_stream::stream! {
            loop {
                // Members compete for the receiver; the lock is released before yielding.
                let next = {
                    let mut rx = queue.rx.lock().await;
                    rx.recv().await
                };
                let Some(Queued { message, attempt }) = next else {
                    break;
                };
                let acker = InMemoryAcker {
                    queue: queue.clone(),
                    message: message.clone(),
                    attempt,
                };
                yield Delivery::new(message, attempt, Box::new(acker));
            }
        };

        Ok(stream.boxed())
    }
}
