use crate::{
    alarm::trigger_alarms::{TriggerAlarmsUseCase, TriggerSummary},
    shared::usecase::execute,
};
use calendar_alarms_infra::{AlarmContext, SchedulerMode};
use calendar_alarms_utils::random_jitter_millis;
use std::{convert::TryFrom, time::Duration};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::info;

/// Delay before the first poll, spreading out workers started together
pub fn get_start_delay(jitter_max: Duration) -> Duration {
    let max_millis = u64::try_from(jitter_max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(random_jitter_millis(max_millis))
}

/// Polls for due alarms and fires them, unless this worker has the
/// scheduler disabled
pub fn start_alarm_trigger_job(ctx: AlarmContext) {
    let scheduler = ctx.config.scheduler.clone();
    if scheduler.mode == SchedulerMode::Disabled {
        info!("The alarm scheduler is disabled on this worker");
        return;
    }

    tokio::spawn(async move {
        sleep(get_start_delay(scheduler.jitter_max)).await;

        let mut poll_interval = interval(scheduler.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            poll_interval.tick().await;
            let usecase = TriggerAlarmsUseCase {
                limit: scheduler.batch_size,
            };
            if let Ok(summary) = execute(usecase, &ctx).await {
                if summary != TriggerSummary::default() {
                    info!("Alarm scheduler tick: {:?}", summary);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_delay_is_bounded_by_jitter() {
        assert_eq!(get_start_delay(Duration::from_millis(0)), Duration::from_millis(0));
        for _ in 0..50 {
            assert!(get_start_delay(Duration::from_millis(20)) < Duration::from_millis(20));
        }
    }
}
