use super::{Acknowledger, Delivery, DeliveryStream, IMessageBroker, QueueTopology};
use anyhow::anyhow;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};
use tokio::sync::{watch, Notify, OwnedSemaphorePermit, Semaphore};

#[derive(Default)]
struct QueueState {
    messages: VecDeque<Vec<u8>>,
    consumers: u32,
    dead_letter_queue: Option<String>,
}

#[derive(Default)]
struct BrokerState {
    /// Exchange name to bound queues
    bindings: HashMap<String, Vec<String>>,
    queues: HashMap<String, QueueState>,
}

struct Inner {
    state: Mutex<BrokerState>,
    /// Woken whenever a message is enqueued anywhere
    notify: Notify,
    generation: watch::Sender<u64>,
}

impl Inner {
    fn enqueue(&self, queue: &str, body: Vec<u8>, front: bool) {
        let mut state = self.state.lock().unwrap();
        let queue = state.queues.entry(queue.to_string()).or_default();
        if front {
            queue.messages.push_front(body);
        } else {
            queue.messages.push_back(body);
        }
        drop(state);
        self.notify.notify_waiters();
    }

    fn dead_letter(&self, queue: &str, body: Vec<u8>) {
        let dead_letter_queue = self
            .state
            .lock()
            .unwrap()
            .queues
            .get(queue)
            .and_then(|q| q.dead_letter_queue.clone());
        if let Some(dead_letter_queue) = dead_letter_queue {
            self.enqueue(&dead_letter_queue, body, false);
        }
    }

    fn pop(&self, queue: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .queues
            .get_mut(queue)
            .and_then(|q| q.messages.pop_front())
    }
}

/// Broker living in the process memory, with the same queueing, dead
/// lettering and redelivery rules as the AMQP one
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BrokerState::default()),
                notify: Notify::new(),
                generation,
            }),
        }
    }

    /// Drops every subscription as a lost connection would and announces the
    /// new connection
    pub fn simulate_reconnection(&self) {
        self.inner.generation.send_modify(|generation| *generation += 1);
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

struct ConsumerGuard {
    inner: Arc<Inner>,
    queue: String,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        if let Some(queue) = self.inner.state.lock().unwrap().queues.get_mut(&self.queue) {
            queue.consumers = queue.consumers.saturating_sub(1);
        }
    }
}

struct ConsumerState {
    inner: Arc<Inner>,
    queue: String,
    permits: Arc<Semaphore>,
    generation: watch::Receiver<u64>,
    _guard: ConsumerGuard,
}

struct InMemoryAcker {
    inner: Arc<Inner>,
    queue: String,
    body: Option<Vec<u8>>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for InMemoryAcker {
    fn drop(&mut self) {
        // Unsettled deliveries go back to the head of the queue
        if let Some(body) = self.body.take() {
            self.inner.enqueue(&self.queue, body, true);
        }
    }
}

#[async_trait::async_trait]
impl Acknowledger for InMemoryAcker {
    async fn ack(self: Box<Self>) -> anyhow::Result<()> {
        let mut this = self;
        this.body.take();
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> anyhow::Result<()> {
        let mut this = self;
        if let Some(body) = this.body.take() {
            if requeue {
                this.inner.enqueue(&this.queue, body, true);
            } else {
                this.inner.dead_letter(&this.queue, body);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IMessageBroker for InMemoryBroker {
    async fn declare_topology(&self, topology: &QueueTopology) -> anyhow::Result<()> {
        let mut state = self.inner.state.lock().unwrap();
        state
            .queues
            .entry(topology.dead_letter_queue.clone())
            .or_default();
        state
            .queues
            .entry(topology.queue.clone())
            .or_default()
            .dead_letter_queue = Some(topology.dead_letter_queue.clone());
        let bound = state
            .bindings
            .entry(topology.exchange.clone())
            .or_default();
        if !bound.contains(&topology.queue) {
            bound.push(topology.queue.clone());
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> anyhow::Result<DeliveryStream> {
        {
            let mut state = self.inner.state.lock().unwrap();
            let queue_state = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| anyhow!("Queue: {} is not declared", queue))?;
            queue_state.consumers += 1;
        }
        let consumer = ConsumerState {
            inner: self.inner.clone(),
            queue: queue.to_string(),
            permits: Arc::new(Semaphore::new(usize::from(prefetch.max(1)))),
            generation: self.inner.generation.subscribe(),
            _guard: ConsumerGuard {
                inner: self.inner.clone(),
                queue: queue.to_string(),
            },
        };

        let stream = futures::stream::unfold(consumer, |mut consumer| async move {
            let permit = tokio::select! {
                permit = consumer.permits.clone().acquire_owned() => permit.ok()?,
                _ = consumer.generation.changed() => return None,
            };
            let inner = consumer.inner.clone();
            loop {
                let notified = inner.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(body) = inner.pop(&consumer.queue) {
                    let acker = InMemoryAcker {
                        inner: inner.clone(),
                        queue: consumer.queue.clone(),
                        body: Some(body.clone()),
                        _permit: permit,
                    };
                    return Some((Ok(Delivery::new(body, Box::new(acker))), consumer));
                }

                tokio::select! {
                    _ = &mut notified => {}
                    _ = consumer.generation.changed() => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn publish(&self, exchange: &str, body: &[u8]) -> anyhow::Result<()> {
        let queues = self
            .inner
            .state
            .lock()
            .unwrap()
            .bindings
            .get(exchange)
            .cloned()
            .ok_or_else(|| anyhow!("Exchange: {} is not declared", exchange))?;
        for queue in queues {
            self.inner.enqueue(&queue, body.to_vec(), false);
        }
        Ok(())
    }

    async fn consumer_count(&self, queue: &str) -> anyhow::Result<u32> {
        self.inner
            .state
            .lock()
            .unwrap()
            .queues
            .get(queue)
            .map(|q| q.consumers)
            .ok_or_else(|| anyhow!("Queue: {} is not declared", queue))
    }

    async fn message_count(&self, queue: &str) -> anyhow::Result<u32> {
        self.inner
            .state
            .lock()
            .unwrap()
            .queues
            .get(queue)
            .map(|q| q.messages.len() as u32)
            .ok_or_else(|| anyhow!("Queue: {} is not declared", queue))
    }

    fn connection_generation(&self) -> watch::Receiver<u64> {
        self.inner.generation.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn topology() -> QueueTopology {
        QueueTopology {
            exchange: "calendar:event:alarm:created".into(),
            queue: "tcalendar:event:alarm:created".into(),
            dead_letter_queue: "tcalendar:event:alarm:created:dead-letter".into(),
        }
    }

    #[tokio::test]
    async fn redeclaring_topology_keeps_messages() {
        let broker = InMemoryBroker::new();
        let t = topology();
        broker.declare_topology(&t).await.unwrap();
        broker.publish(&t.exchange, b"one").await.unwrap();
        broker.declare_topology(&t).await.unwrap();
        broker.publish(&t.exchange, b"two").await.unwrap();

        // Not bound twice
        assert_eq!(broker.message_count(&t.queue).await.unwrap(), 2);
        assert_eq!(broker.message_count(&t.dead_letter_queue).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ack_nack_and_redelivery() {
        let broker = InMemoryBroker::new();
        let t = topology();
        broker.declare_topology(&t).await.unwrap();
        let mut deliveries = broker.consume(&t.queue, 4).await.unwrap();
        assert_eq!(broker.consumer_count(&t.queue).await.unwrap(), 1);

        broker.publish(&t.exchange, b"ok").await.unwrap();
        broker.publish(&t.exchange, b"poison").await.unwrap();
        broker.publish(&t.exchange, b"dropped").await.unwrap();

        let ok = deliveries.next().await.unwrap().unwrap();
        assert_eq!(ok.body, b"ok");
        ok.ack().await.unwrap();

        let poison = deliveries.next().await.unwrap().unwrap();
        poison.nack(false).await.unwrap();
        assert_eq!(broker.message_count(&t.dead_letter_queue).await.unwrap(), 1);

        let dropped = deliveries.next().await.unwrap().unwrap();
        assert_eq!(dropped.body, b"dropped");
        drop(dropped);
        let redelivered = deliveries.next().await.unwrap().unwrap();
        assert_eq!(redelivered.body, b"dropped");
        redelivered.ack().await.unwrap();

        assert_eq!(broker.message_count(&t.queue).await.unwrap(), 0);
        drop(deliveries);
        assert_eq!(broker.consumer_count(&t.queue).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reconnection_ends_subscriptions() {
        let broker = InMemoryBroker::new();
        let t = topology();
        broker.declare_topology(&t).await.unwrap();
        let mut generation = broker.connection_generation();
        let mut deliveries = broker.consume(&t.queue, 1).await.unwrap();

        broker.simulate_reconnection();
        let next = tokio::time::timeout(Duration::from_secs(1), deliveries.next())
            .await
            .expect("Stream to end");
        assert!(next.is_none());
        assert!(generation.changed().await.is_ok());
        assert_eq!(*generation.borrow(), 1);
        drop(deliveries);
        assert_eq!(broker.consumer_count(&t.queue).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_queue_and_exchange_are_errors() {
        let broker = InMemoryBroker::new();
        assert!(broker.consume("nope", 1).await.is_err());
        assert!(broker.publish("nope", b"x").await.is_err());
        assert!(broker.consumer_count("nope").await.is_err());
    }
}
