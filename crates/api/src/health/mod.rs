use crate::consumer::ConsumerSupervisor;
use calendar_alarms_api_structs::get_healthcheck::{
    APIResponse, ComponentHealthDTO, HealthStatus,
};
use calendar_alarms_domain::AlarmQueue;
use calendar_alarms_infra::AlarmContext;
use tracing::warn;

const CONSUMERS: &str = "alarm-consumers";
const DEAD_LETTERS: &str = "alarm-dead-letters";

fn component(name: &str, status: HealthStatus, message: Option<String>) -> ComponentHealthDTO {
    ComponentHealthDTO {
        component: name.into(),
        status,
        message,
    }
}

/// Every work queue needs a consumer. A queue without one means a stuck
/// subscription, so a resubscription is requested.
pub async fn check_consumers(
    ctx: &AlarmContext,
    supervisor: &ConsumerSupervisor,
) -> ComponentHealthDTO {
    let mut idle = Vec::new();
    for queue in AlarmQueue::ALL.iter() {
        match ctx.broker.consumer_count(&queue.queue()).await {
            Ok(0) => idle.push(queue.queue()),
            Ok(_) => {}
            Err(e) => {
                return component(
                    CONSUMERS,
                    HealthStatus::Unhealthy,
                    Some(format!("Unable to inspect {}: {}", queue.queue(), e)),
                )
            }
        }
    }

    if idle.is_empty() {
        return component(CONSUMERS, HealthStatus::Healthy, None);
    }
    warn!("No consumers on: {:?}, requesting a restart", idle);
    supervisor.request_restart();
    component(
        CONSUMERS,
        HealthStatus::Degraded,
        Some(format!("No consumers on: {}", idle.join(", "))),
    )
}

/// Dead lettered notifications wait for an operator, which degrades but does
/// not break the service
pub async fn check_dead_letters(ctx: &AlarmContext) -> ComponentHealthDTO {
    let mut pending = Vec::new();
    for queue in AlarmQueue::ALL.iter() {
        let dead_letter_queue = queue.dead_letter_queue();
        match ctx.broker.message_count(&dead_letter_queue).await {
            Ok(0) => {}
            Ok(count) => pending.push(format!("{} ({})", dead_letter_queue, count)),
            Err(e) => {
                return component(
                    DEAD_LETTERS,
                    HealthStatus::Unhealthy,
                    Some(format!("Unable to inspect {}: {}", dead_letter_queue, e)),
                )
            }
        }
    }

    if pending.is_empty() {
        component(DEAD_LETTERS, HealthStatus::Healthy, None)
    } else {
        component(
            DEAD_LETTERS,
            HealthStatus::Degraded,
            Some(format!("Messages waiting in: {}", pending.join(", "))),
        )
    }
}

pub async fn run_health_checks(ctx: &AlarmContext, supervisor: &ConsumerSupervisor) -> APIResponse {
    let (consumers, dead_letters) =
        futures::join!(check_consumers(ctx, supervisor), check_dead_letters(ctx));
    APIResponse::new(vec![consumers, dead_letters])
}
