use super::EventAlarmConsumer;
use calendar_alarms_infra::AlarmContext;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, warn};

#[derive(Debug)]
pub enum ConsumerCommand {
    /// Drop every subscription and subscribe again
    Restart,
}

/// Handle to the task owning this worker's `EventAlarmConsumer`. The task
/// resubscribes when the broker connection is re-established or when asked to.
#[derive(Clone)]
pub struct ConsumerSupervisor {
    commands: mpsc::Sender<ConsumerCommand>,
}

impl ConsumerSupervisor {
    pub fn start(ctx: AlarmContext) -> Self {
        // A single pending command is enough as restarts are not cumulative
        let (commands, receiver) = mpsc::channel(1);
        tokio::spawn(supervise(ctx, receiver));
        Self { commands }
    }

    /// Supervisor whose commands are only collected, for tests
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::Receiver<ConsumerCommand>) {
        let (commands, receiver) = mpsc::channel(1);
        (Self { commands }, receiver)
    }

    pub fn request_restart(&self) {
        match self.commands.try_send(ConsumerCommand::Restart) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => warn!("The consumer supervisor is not running"),
        }
    }
}

async fn supervise(ctx: AlarmContext, mut commands: mpsc::Receiver<ConsumerCommand>) {
    let retry_interval = ctx.config.broker_reconnect_interval;
    let mut generation = ctx.broker.connection_generation();
    let mut consumer = EventAlarmConsumer::new(ctx);

    let mut subscribed = start(&mut consumer).await;
    loop {
        tokio::select! {
            Some(command) = commands.recv() => match command {
                ConsumerCommand::Restart => {
                    info!("Restarting the alarm notification consumers");
                    subscribed = restart(&mut consumer).await;
                }
            },
            changed = generation.changed() => {
                if changed.is_err() {
                    break;
                }
                info!("The broker connection was re-established, resubscribing");
                subscribed = restart(&mut consumer).await;
            }
            _ = tokio::time::sleep(retry_interval), if !subscribed => {
                subscribed = restart(&mut consumer).await;
            }
        }
    }

    consumer.stop();
}

async fn start(consumer: &mut EventAlarmConsumer) -> bool {
    match consumer.start().await {
        Ok(()) => true,
        Err(e) => {
            error!("Unable to subscribe to the alarm notification queues. Err: {:?}", e);
            false
        }
    }
}

async fn restart(consumer: &mut EventAlarmConsumer) -> bool {
    consumer.stop();
    start(consumer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::tests::{eventually, setup};
    use calendar_alarms_domain::AlarmQueue;
    use calendar_alarms_infra::IMessageBroker;

    #[tokio::test]
    async fn resubscribes_after_reconnection() {
        let (ctx, broker, _) = setup().await;
        let _supervisor = ConsumerSupervisor::start(ctx);

        let queue = &AlarmQueue::Deleted.queue();
        let in_memory = broker.as_ref();
        assert!(
            eventually(|| async move { matches!(in_memory.consumer_count(queue).await, Ok(1)) }).await
        );

        // The lost connection ends every subscription
        broker.simulate_reconnection();
        assert!(
            eventually(|| async move { matches!(in_memory.consumer_count(queue).await, Ok(1)) }).await
        );
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(broker.consumer_count(queue).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn restarts_on_request() {
        let (ctx, broker, _) = setup().await;
        let supervisor = ConsumerSupervisor::start(ctx);

        let queue = &AlarmQueue::Created.queue();
        let in_memory = broker.as_ref();
        assert!(
            eventually(|| async move { matches!(in_memory.consumer_count(queue).await, Ok(1)) }).await
        );

        supervisor.request_restart();
        supervisor.request_restart();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(
            eventually(|| async move { matches!(in_memory.consumer_count(queue).await, Ok(1)) }).await
        );
    }
}
