mod inmemory;
mod rabbitmq;

use calendar_alarms_domain::AlarmQueue;
use futures::stream::BoxStream;
pub use inmemory::InMemoryBroker;
pub use rabbitmq::RabbitMqBroker;
use tokio::sync::watch;

/// Exchange, work queue and dead letter queue of one notification kind
#[derive(Debug, Clone, PartialEq)]
pub struct QueueTopology {
    pub exchange: String,
    pub queue: String,
    pub dead_letter_queue: String,
}

impl From<AlarmQueue> for QueueTopology {
    fn from(queue: AlarmQueue) -> Self {
        Self {
            exchange: queue.exchange(),
            queue: queue.queue(),
            dead_letter_queue: queue.dead_letter_queue(),
        }
    }
}

/// Settles a delivery with the broker
#[async_trait::async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(self: Box<Self>) -> anyhow::Result<()>;
    /// Without `requeue` the message is routed to the dead letter queue
    async fn nack(self: Box<Self>, requeue: bool) -> anyhow::Result<()>;
}

/// A message handed to a consumer. Dropping it unsettled leaves it to the
/// broker to redeliver.
pub struct Delivery {
    pub body: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(body: Vec<u8>, acker: Box<dyn Acknowledger>) -> Self {
        Self { body, acker }
    }

    pub async fn ack(self) -> anyhow::Result<()> {
        self.acker.ack().await
    }

    pub async fn nack(self, requeue: bool) -> anyhow::Result<()> {
        self.acker.nack(requeue).await
    }
}

pub type DeliveryStream = BoxStream<'static, anyhow::Result<Delivery>>;

#[async_trait::async_trait]
pub trait IMessageBroker: Send + Sync {
    /// Declares the durable fanout exchange, the dead letter queue and the work
    /// queue bound to the exchange. Safe to repeat.
    async fn declare_topology(&self, topology: &QueueTopology) -> anyhow::Result<()>;
    /// Subscribes to `queue` with at most `prefetch` unsettled deliveries. The
    /// stream ends when the connection is lost.
    async fn consume(&self, queue: &str, prefetch: u16) -> anyhow::Result<DeliveryStream>;
    async fn publish(&self, exchange: &str, body: &[u8]) -> anyhow::Result<()>;
    async fn consumer_count(&self, queue: &str) -> anyhow::Result<u32>;
    async fn message_count(&self, queue: &str) -> anyhow::Result<u32>;
    /// Bumped every time the connection to the broker is re-established
    fn connection_generation(&self) -> watch::Receiver<u64>;
}
