use super::{Acknowledger, Delivery, DeliveryStream, IMessageBroker, QueueTopology};
use calendar_alarms_utils::create_random_secret;
use futures::{Stream, StreamExt};
use lapin::{
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use std::{
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

struct Link {
    connection: Connection,
    publisher: Channel,
}

impl Link {
    async fn open(uri: &str) -> anyhow::Result<Self> {
        let connection = Connection::connect(uri, ConnectionProperties::default()).await?;
        let publisher = connection.create_channel().await?;
        publisher
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        Ok(Self {
            connection,
            publisher,
        })
    }
}

struct Inner {
    uri: String,
    link: RwLock<Link>,
    generation: watch::Sender<u64>,
}

/// AMQP 0-9-1 broker connection that reconnects on its own
#[derive(Clone)]
pub struct RabbitMqBroker {
    inner: Arc<Inner>,
}

impl RabbitMqBroker {
    /// Connects to the broker and keeps watching the connection, reconnecting
    /// every `reconnect_interval` while it is down
    pub async fn connect(uri: &str, reconnect_interval: Duration) -> anyhow::Result<Self> {
        let link = Link::open(uri).await?;
        info!("Connected to the message broker");
        let (generation, _) = watch::channel(0);
        let inner = Arc::new(Inner {
            uri: uri.to_string(),
            link: RwLock::new(link),
            generation,
        });
        tokio::spawn(watch_connection(Arc::downgrade(&inner), reconnect_interval));
        Ok(Self { inner })
    }

    async fn channel(&self) -> anyhow::Result<Channel> {
        let channel = self.inner.link.read().await.connection.create_channel().await?;
        Ok(channel)
    }

    async fn inspect_queue(&self, queue: &str) -> anyhow::Result<lapin::Queue> {
        let channel = self.channel().await?;
        let declared = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await;
        close_channel(channel).await;
        Ok(declared?)
    }
}

async fn watch_connection(inner: Weak<Inner>, reconnect_interval: Duration) {
    let mut interval = tokio::time::interval(reconnect_interval);
    loop {
        interval.tick().await;
        let inner = match inner.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        if inner.link.read().await.connection.status().connected() {
            continue;
        }
        warn!("Connection to the message broker is lost. Reconnecting.");
        match Link::open(&inner.uri).await {
            Ok(link) => {
                *inner.link.write().await = link;
                inner.generation.send_modify(|generation| *generation += 1);
                info!("Reconnected to the message broker");
            }
            Err(e) => {
                error!("Unable to reconnect to the message broker: {:?}", e);
            }
        }
    }
}

/// Unique per subscription so that consumers show up apart in the broker
fn consumer_tag(queue: &str) -> String {
    format!("{}:{}", queue, create_random_secret(8))
}

async fn close_channel(channel: Channel) {
    if let Err(e) = channel.close(200, "OK").await {
        debug!("Unable to close broker channel: {:?}", e);
    }
}

struct RabbitMqAcker(Acker);

#[async_trait::async_trait]
impl Acknowledger for RabbitMqAcker {
    async fn ack(self: Box<Self>) -> anyhow::Result<()> {
        self.0.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> anyhow::Result<()> {
        self.0
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await?;
        Ok(())
    }
}

/// Subscription owning its channel. The channel is closed once the stream is
/// dropped, which hands unsettled deliveries back to the broker.
struct ConsumerStream {
    consumer: lapin::Consumer,
    channel: Channel,
}

impl Stream for ConsumerStream {
    type Item = anyhow::Result<Delivery>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.consumer.poll_next_unpin(cx).map(|item| {
            item.map(|delivery| {
                delivery
                    .map(|delivery| {
                        Delivery::new(delivery.data, Box::new(RabbitMqAcker(delivery.acker)))
                    })
                    .map_err(anyhow::Error::from)
            })
        })
    }
}

impl Drop for ConsumerStream {
    fn drop(&mut self) {
        let channel = self.channel.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(close_channel(channel));
        }
    }
}

#[async_trait::async_trait]
impl IMessageBroker for RabbitMqBroker {
    async fn declare_topology(&self, topology: &QueueTopology) -> anyhow::Result<()> {
        let channel = self.channel().await?;
        let durable = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };

        let declared = async {
            channel
                .exchange_declare(
                    &topology.exchange,
                    ExchangeKind::Fanout,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            channel
                .queue_declare(&topology.dead_letter_queue, durable, FieldTable::default())
                .await?;

            let mut arguments = FieldTable::default();
            arguments.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString("".into()),
            );
            arguments.insert(
                "x-dead-letter-routing-key".into(),
                AMQPValue::LongString(topology.dead_letter_queue.as_str().into()),
            );
            channel
                .queue_declare(&topology.queue, durable, arguments)
                .await?;
            channel
                .queue_bind(
                    &topology.queue,
                    &topology.exchange,
                    "",
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
            Ok::<(), lapin::Error>(())
        }
        .await;
        close_channel(channel).await;
        Ok(declared?)
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> anyhow::Result<DeliveryStream> {
        let channel = self.channel().await?;
        channel
            .basic_qos(prefetch.max(1), BasicQosOptions::default())
            .await?;
        let consumer = channel
            .basic_consume(
                queue,
                &consumer_tag(queue),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(Box::pin(ConsumerStream { consumer, channel }))
    }

    async fn publish(&self, exchange: &str, body: &[u8]) -> anyhow::Result<()> {
        let link = self.inner.link.read().await;
        link.publisher
            .basic_publish(
                exchange,
                "",
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn consumer_count(&self, queue: &str) -> anyhow::Result<u32> {
        Ok(self.inspect_queue(queue).await?.consumer_count())
    }

    async fn message_count(&self, queue: &str) -> anyhow::Result<u32> {
        Ok(self.inspect_queue(queue).await?.message_count())
    }

    fn connection_generation(&self) -> watch::Receiver<u64> {
        self.inner.generation.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_tags_are_unique_per_subscription() {
        let first = consumer_tag("tcalendar:event:alarm:created");
        let second = consumer_tag("tcalendar:event:alarm:created");
        assert!(first.starts_with("tcalendar:event:alarm:created:"));
        assert_ne!(first, second);
    }
}
