use super::alarms_enabled;
use crate::shared::usecase::UseCase;
use calendar_alarms_domain::{
    AlarmEvent, AlarmInstantCalculator, EventDocument, EventPath, LeaseError, LeaseKey,
};
use calendar_alarms_infra::AlarmContext;
use futures::StreamExt;
use tracing::{error, info, warn};

/// Alarms fired at the same time by one worker
const FIRING_CONCURRENCY: usize = 4;

/// Fires the alarms that are due and moves them to their next occurrence
#[derive(Debug)]
pub struct TriggerAlarmsUseCase {
    /// Maximum number of alarms fired by one execution
    pub limit: i64,
}

#[derive(Debug, Default, PartialEq)]
pub struct TriggerSummary {
    pub sent: usize,
    /// Due alarms of recipients that have alarms disabled
    pub suppressed: usize,
    /// Due alarms another worker held the lease of
    pub contended: usize,
    /// Alarms found too long after their due time, dropped without sending
    pub expired: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub enum UseCaseError {
    StorageError,
}

#[derive(Debug, PartialEq)]
enum FireOutcome {
    Sent,
    Suppressed,
    Contended,
    Expired,
    Failed,
}

#[async_trait::async_trait]
impl UseCase for TriggerAlarmsUseCase {
    type Response = TriggerSummary;

    type Error = UseCaseError;

    const NAME: &'static str = "TriggerAlarms";

    async fn execute(&mut self, ctx: &AlarmContext) -> Result<Self::Response, Self::Error> {
        // Leases of fired alarms are left to expire, so expired ones are swept here
        if let Err(e) = ctx.repos.leases.purge_expired().await {
            warn!("Unable to purge expired alarm leases. Err: {:?}", e);
        }

        let now = ctx.sys.now();
        let due = ctx
            .repos
            .alarm_events
            .find_alarms_to_trigger(now, self.limit)
            .await
            .map_err(|e| {
                error!("Unable to look up due alarms. Err: {:?}", e);
                UseCaseError::StorageError
            })?;

        let firings: Vec<_> = due.into_iter().map(|alarm| fire_alarm(alarm, ctx)).collect();
        let outcomes: Vec<FireOutcome> = futures::stream::iter(firings)
            .buffer_unordered(FIRING_CONCURRENCY)
            .collect()
            .await;

        let mut summary = TriggerSummary::default();
        for outcome in outcomes {
            match outcome {
                FireOutcome::Sent => summary.sent += 1,
                FireOutcome::Suppressed => summary.suppressed += 1,
                FireOutcome::Contended => summary.contended += 1,
                FireOutcome::Expired => summary.expired += 1,
                FireOutcome::Failed => summary.failed += 1,
            }
        }
        Ok(summary)
    }
}

async fn fire_alarm(alarm: AlarmEvent, ctx: &AlarmContext) -> FireOutcome {
    let key = LeaseKey::for_alarm(&alarm);
    match ctx
        .repos
        .leases
        .acquire(&key, ctx.config.scheduler.lease_ttl)
        .await
    {
        Ok(_) => {}
        Err(LeaseError::AlreadyHeld(key)) => {
            info!("Alarm: {} is already being fired by another worker", key);
            return FireOutcome::Contended;
        }
        Err(LeaseError::Storage(e)) => {
            error!("Unable to acquire lease for alarm: {}. Err: {:?}", key, e);
            return FireOutcome::Failed;
        }
    }

    // On success the lease is left to expire so that workers that read the
    // alarm before it was rescheduled stand down
    match deliver(&alarm, ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Unable to fire alarm: {}. Err: {:?}", key, e);
            if let Err(e) = ctx.repos.leases.release(&key).await {
                error!("Unable to release lease for alarm: {}. Err: {:?}", key, e);
            }
            FireOutcome::Failed
        }
    }
}

async fn deliver(alarm: &AlarmEvent, ctx: &AlarmContext) -> anyhow::Result<FireOutcome> {
    let grace = chrono::Duration::from_std(ctx.config.scheduler.late_grace)?;
    if alarm.is_overdue(&ctx.sys.now(), grace) {
        warn!(
            "Dropping alarm of event: {} for: {} that was due at: {}",
            alarm.event_uid, alarm.recipient, alarm.alarm_time
        );
        reschedule_or_remove(alarm, ctx).await?;
        return Ok(FireOutcome::Expired);
    }

    let enabled = match ctx.repos.users.find_by_email(&alarm.recipient).await {
        Ok(Some(user)) => alarms_enabled(&user, ctx).await,
        // Recipients without an account get their reminders
        Ok(None) => true,
        Err(e) => {
            warn!(
                "Unable to look up recipient: {}, assuming alarms enabled. Err: {:?}",
                alarm.recipient, e
            );
            true
        }
    };

    let outcome = if enabled {
        ctx.services.notifier.notify(alarm).await?;
        FireOutcome::Sent
    } else {
        FireOutcome::Suppressed
    };
    reschedule_or_remove(alarm, ctx).await?;

    Ok(outcome)
}

async fn reschedule_or_remove(alarm: &AlarmEvent, ctx: &AlarmContext) -> anyhow::Result<()> {
    if alarm.recurring {
        if let Some(next) = next_alarm(alarm, ctx).await? {
            ctx.repos.alarm_events.update(&next).await?;
            return Ok(());
        }
    }
    ctx.repos
        .alarm_events
        .delete(&alarm.event_uid, &alarm.recipient)
        .await
}

/// The alarm of the same recipient at the next occurrence, computed from the
/// stored snapshot of the event
async fn next_alarm(alarm: &AlarmEvent, ctx: &AlarmContext) -> anyhow::Result<Option<AlarmEvent>> {
    let document = EventDocument::from_snapshot(&alarm.raw_event_data)?;
    let owner = match alarm.event_path.parse::<EventPath>() {
        Ok(path) => ctx.repos.users.find(&path.calendar_home_id).await?,
        Err(_) => None,
    };
    let owner_email = owner
        .map(|owner| owner.email)
        .unwrap_or_else(|| alarm.recipient.clone());

    let calculator = AlarmInstantCalculator::new(ctx.config.default_timezone);
    let instant = calculator.compute_next_alarm_instant(&document, &owner_email, ctx.sys.now())?;

    Ok(instant
        .filter(|instant| instant.recipients.contains(&alarm.recipient))
        .map(|instant| alarm.reschedule(&instant)))
}
