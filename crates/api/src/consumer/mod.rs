mod supervisor;

use crate::alarm::handle_event_alarm::{
    AlarmNotification, AlarmOutcome, HandleEventAlarmUseCase, UseCaseError,
};
use crate::shared::usecase::execute;
use calendar_alarms_api_structs::dtos::CalendarAlarmMessageDTO;
use calendar_alarms_domain::AlarmQueue;
use calendar_alarms_infra::{AlarmContext, Delivery, DeliveryStream, QueueTopology};
use futures::{future, StreamExt};
use std::{collections::HashMap, convert::TryFrom, sync::Arc};
pub use supervisor::{ConsumerCommand, ConsumerSupervisor};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("Malformed notification: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unable to handle notification: {0:?}")]
    Handler(UseCaseError),
}

/// Subscriptions of this worker to the alarm notification queues. Only the
/// owner mutates them, through `start`, `stop` and `restart`.
pub struct EventAlarmConsumer {
    ctx: AlarmContext,
    subscriptions: HashMap<AlarmQueue, JoinHandle<()>>,
}

impl EventAlarmConsumer {
    pub fn new(ctx: AlarmContext) -> Self {
        Self {
            ctx,
            subscriptions: HashMap::new(),
        }
    }

    /// Declares the topology of every notification kind and subscribes to its
    /// work queue
    pub async fn start(&mut self) -> anyhow::Result<()> {
        let prefetch = u16::try_from(self.ctx.config.consumer_concurrency).unwrap_or(u16::MAX);
        for queue in AlarmQueue::ALL.iter().copied() {
            self.ctx
                .broker
                .declare_topology(&QueueTopology::from(queue))
                .await?;
            let deliveries = self.ctx.broker.consume(&queue.queue(), prefetch).await?;
            let handle = tokio::spawn(consume_queue(queue, deliveries, self.ctx.clone()));
            if let Some(previous) = self.subscriptions.insert(queue, handle) {
                previous.abort();
            }
            info!("Consuming alarm notifications from: {}", queue.queue());
        }
        Ok(())
    }

    /// Drops every subscription. Deliveries in flight are left unsettled for
    /// the broker to redeliver.
    pub fn stop(&mut self) {
        for (queue, handle) in self.subscriptions.drain() {
            handle.abort();
            debug!("Stopped consuming from: {}", queue.queue());
        }
    }

    pub async fn restart(&mut self) -> anyhow::Result<()> {
        self.stop();
        self.start().await
    }
}

impl Drop for EventAlarmConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn consume_queue(queue: AlarmQueue, deliveries: DeliveryStream, ctx: AlarmContext) {
    let ctx = Arc::new(ctx);
    let concurrency = ctx.config.consumer_concurrency;

    deliveries
        .take_while(|delivery| {
            if let Err(e) = delivery {
                error!("Subscription to: {} failed. Err: {:?}", queue.queue(), e);
            }
            future::ready(delivery.is_ok())
        })
        .filter_map(|delivery| future::ready(delivery.ok()))
        .for_each_concurrent(concurrency, |delivery| {
            let ctx = ctx.clone();
            async move { process_delivery(queue, delivery, &ctx).await }
        })
        .await;

    warn!("Subscription to: {} ended", queue.queue());
}

/// Handles one delivery and settles it: acknowledged on success, dead
/// lettered on any failure
pub async fn process_delivery(queue: AlarmQueue, delivery: Delivery, ctx: &AlarmContext) {
    let settled = match handle_message(queue, &delivery.body, ctx).await {
        Ok(outcome) => {
            debug!("Handled {} notification: {:?}", queue, outcome);
            delivery.ack().await
        }
        Err(e) => {
            error!(
                "Dead lettering {} notification: {}. Body: {}",
                queue,
                e,
                String::from_utf8_lossy(&delivery.body)
            );
            delivery.nack(false).await
        }
    };
    if let Err(e) = settled {
        error!("Unable to settle {} notification. Err: {:?}", queue, e);
    }
}

pub async fn handle_message(
    queue: AlarmQueue,
    body: &[u8],
    ctx: &AlarmContext,
) -> Result<AlarmOutcome, ConsumeError> {
    let message: CalendarAlarmMessageDTO = serde_json::from_slice(body)?;
    let usecase = HandleEventAlarmUseCase {
        notification: AlarmNotification::new(queue.handler(), message),
    };
    execute(usecase, ctx).await.map_err(ConsumeError::Handler)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use calendar_alarms_domain::{jcal::parse_jcal, EventUid, User};
    use calendar_alarms_infra::{IMessageBroker, InMemoryBroker, InMemoryCalendarStore, ManualSys};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::{future::Future, time::Duration};

    /// Polls `condition` until it holds or a second has passed
    pub async fn eventually<F, Fut>(mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..100 {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    pub async fn setup() -> (AlarmContext, Arc<InMemoryBroker>, Arc<InMemoryCalendarStore>) {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        let mut ctx = AlarmContext::create_inmemory_with_sys(Arc::new(ManualSys::new(now)));
        let broker = Arc::new(InMemoryBroker::new());
        let store = Arc::new(InMemoryCalendarStore::new());
        ctx.broker = broker.clone();
        ctx.services.calendar_store = store.clone();
        ctx.config.recipient_filter = Default::default();
        ctx.repos
            .users
            .insert(&User::new("home1", "alice@example.com".parse().unwrap()))
            .await
            .unwrap();
        (ctx, broker, store)
    }

    fn notification() -> serde_json::Value {
        json!({
            "eventPath": "/calendars/home1/cal1/party.ics",
            "event": ["vcalendar", [], [
                ["vevent", [
                    ["uid", {}, "text", "party"],
                    ["dtstart", {}, "date-time", "2025-03-10T20:00:00Z"]
                ], [
                    ["valarm", [
                        ["action", {}, "text", "DISPLAY"],
                        ["trigger", {}, "duration", "-PT1H"]
                    ], []]
                ]]
            ]]
        })
    }

    async fn alarm_count(ctx: &AlarmContext) -> usize {
        ctx.repos
            .alarm_events
            .find(&EventUid::new("party"), &"alice@example.com".parse().unwrap())
            .await
            .unwrap()
            .into_iter()
            .count()
    }

    #[tokio::test]
    async fn schedules_from_published_notification() {
        let (ctx, broker, store) = setup().await;
        let message = notification();
        store.put(
            &"/calendars/home1/cal1/party.ics".parse().unwrap(),
            parse_jcal(&message["event"]).unwrap(),
        );
        let mut consumer = EventAlarmConsumer::new(ctx.clone());
        consumer.start().await.unwrap();

        broker
            .publish(
                &AlarmQueue::Created.exchange(),
                message.to_string().as_bytes(),
            )
            .await
            .unwrap();
        let context = &ctx;
        assert!(eventually(|| async move { alarm_count(context).await == 1 }).await);

        let queue = AlarmQueue::Created;
        assert_eq!(broker.message_count(&queue.queue()).await.unwrap(), 0);
        assert_eq!(
            broker.message_count(&queue.dead_letter_queue()).await.unwrap(),
            0
        );

        broker
            .publish(
                &AlarmQueue::Cancel.exchange(),
                message.to_string().as_bytes(),
            )
            .await
            .unwrap();
        assert!(eventually(|| async move { alarm_count(context).await == 0 }).await);
    }

    #[tokio::test]
    async fn malformed_notification_is_dead_lettered() {
        let (ctx, broker, _) = setup().await;
        let mut consumer = EventAlarmConsumer::new(ctx.clone());
        consumer.start().await.unwrap();

        let queue = AlarmQueue::Updated;
        broker
            .publish(&queue.exchange(), b"{ this is not json")
            .await
            .unwrap();
        let dead_letter_queue = &queue.dead_letter_queue();
        let broker = broker.as_ref();
        assert!(
            eventually(|| async move {
                broker.message_count(dead_letter_queue).await.unwrap() == 1
            })
            .await
        );
        assert_eq!(alarm_count(&ctx).await, 0);
    }

    #[tokio::test]
    async fn stop_and_restart_subscriptions() {
        let (ctx, broker, _) = setup().await;
        let mut consumer = EventAlarmConsumer::new(ctx);
        consumer.start().await.unwrap();
        for queue in AlarmQueue::ALL.iter() {
            assert_eq!(broker.consumer_count(&queue.queue()).await.unwrap(), 1);
        }

        consumer.stop();
        let queue = &AlarmQueue::Request.queue();
        let broker = broker.as_ref();
        assert!(eventually(|| async move { broker.consumer_count(queue).await.unwrap() == 0 }).await);

        consumer.restart().await.unwrap();
        assert!(eventually(|| async move { broker.consumer_count(queue).await.unwrap() == 1 }).await);
    }
}
