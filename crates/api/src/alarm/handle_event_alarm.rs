use super::{alarm_recipients, alarms_enabled};
use crate::shared::usecase::UseCase;
use calendar_alarms_api_structs::dtos::CalendarAlarmMessageDTO;
use calendar_alarms_domain::{
    jcal::{extract_event_uid, parse_jcal},
    AlarmEvent, AlarmHandlerKind, AlarmInstantCalculator, EventPath, EventUid, MailAddress, User,
};
use calendar_alarms_infra::{AlarmContext, MissingAccountPolicy, WriteResult};
use tracing::{debug, error, info, warn};

/// A calendar change notification, dispatched on what it does to the alarms
/// of the event
#[derive(Debug)]
pub enum AlarmNotification {
    CreateOrUpdate(CalendarAlarmMessageDTO),
    Delete(CalendarAlarmMessageDTO),
}

impl AlarmNotification {
    pub fn new(kind: AlarmHandlerKind, message: CalendarAlarmMessageDTO) -> Self {
        match kind {
            AlarmHandlerKind::CreateOrUpdate => Self::CreateOrUpdate(message),
            AlarmHandlerKind::Delete => Self::Delete(message),
        }
    }

    fn message(&self) -> &CalendarAlarmMessageDTO {
        match self {
            Self::CreateOrUpdate(message) | Self::Delete(message) => message,
        }
    }
}

/// Why a notification was acknowledged without touching any alarm
#[derive(Debug, PartialEq)]
pub enum SkipReason {
    OwnerNotFound,
    AlarmsDisabled,
    /// The calendar store could not serve the event
    EventUnavailable,
}

#[derive(Debug, PartialEq)]
pub enum AlarmOutcome {
    /// Alarms were written for `recipients`. `stale` counts the writes dropped
    /// because a newer revision of the event is already stored.
    Scheduled {
        recipients: Vec<MailAddress>,
        stale: usize,
    },
    /// No alarm is due anymore for `recipients`
    Removed { recipients: Vec<MailAddress> },
    Skipped(SkipReason),
}

#[derive(Debug)]
pub enum UseCaseError {
    InvalidEventPath(String),
    InvalidEvent(String),
    OwnerNotFound(String),
    StorageError,
}

/// Reconciles the stored alarms of an event with a change notification
#[derive(Debug)]
pub struct HandleEventAlarmUseCase {
    pub notification: AlarmNotification,
}

#[async_trait::async_trait]
impl UseCase for HandleEventAlarmUseCase {
    type Response = AlarmOutcome;

    type Error = UseCaseError;

    const NAME: &'static str = "HandleEventAlarm";

    async fn execute(&mut self, ctx: &AlarmContext) -> Result<Self::Response, Self::Error> {
        let path = self
            .notification
            .message()
            .parse_event_path()
            .map_err(|e| UseCaseError::InvalidEventPath(e.to_string()))?;
        let owner = match resolve_owner(&path, ctx).await? {
            Some(owner) => owner,
            None => return Ok(AlarmOutcome::Skipped(SkipReason::OwnerNotFound)),
        };

        match &self.notification {
            AlarmNotification::CreateOrUpdate(message) => {
                create_or_update(message, &path, &owner, ctx).await
            }
            AlarmNotification::Delete(message) => delete(message, &owner, ctx).await,
        }
    }
}

async fn resolve_owner(path: &EventPath, ctx: &AlarmContext) -> Result<Option<User>, UseCaseError> {
    let owner = ctx
        .repos
        .users
        .find(&path.calendar_home_id)
        .await
        .map_err(|e| {
            error!(
                "Unable to look up the owner of calendar home: {}. Err: {:?}",
                path.calendar_home_id, e
            );
            UseCaseError::StorageError
        })?;

    match (owner, ctx.config.missing_account_policy) {
        (Some(owner), _) => Ok(Some(owner)),
        (None, MissingAccountPolicy::Skip) => {
            info!(
                "No user owns calendar home: {}, skipping alarms of event: {}",
                path.calendar_home_id, path
            );
            Ok(None)
        }
        (None, MissingAccountPolicy::Fail) => {
            Err(UseCaseError::OwnerNotFound(path.calendar_home_id.clone()))
        }
    }
}

async fn create_or_update(
    message: &CalendarAlarmMessageDTO,
    path: &EventPath,
    owner: &User,
    ctx: &AlarmContext,
) -> Result<AlarmOutcome, UseCaseError> {
    if !alarms_enabled(owner, ctx).await {
        debug!("User: {} has alarms disabled", owner.id);
        return Ok(AlarmOutcome::Skipped(SkipReason::AlarmsDisabled));
    }

    // The notification may be outdated, so the current state is fetched
    let document = match ctx.services.calendar_store.fetch_event(owner, path).await {
        Ok(document) => document,
        Err(e) => {
            warn!(
                "Unable to fetch event: {}, leaving its alarms unchanged. Err: {:?}",
                path, e
            );
            return Ok(AlarmOutcome::Skipped(SkipReason::EventUnavailable));
        }
    };
    let event_uid = match document.uid() {
        Some(uid) => EventUid::new(uid),
        None => EventUid::new(
            extract_event_uid(&message.event)
                .map_err(|e| UseCaseError::InvalidEvent(e.to_string()))?,
        ),
    };

    let calculator = AlarmInstantCalculator::new(ctx.config.default_timezone);
    let instant = calculator
        .compute_next_alarm_instant(&document, &owner.email, ctx.sys.now())
        .map_err(|e| UseCaseError::InvalidEvent(e.to_string()))?;
    let stored = find_stored_alarms(&event_uid, ctx).await?;
    let instant = match instant {
        Some(instant) => instant,
        None => {
            let mut recipients = alarm_recipients(&document, owner);
            for alarm in stored {
                if !recipients.contains(&alarm.recipient) {
                    recipients.push(alarm.recipient);
                }
            }
            remove_alarms(&event_uid, &recipients, ctx).await?;
            return Ok(AlarmOutcome::Removed { recipients });
        }
    };

    let recipients: Vec<MailAddress> = instant
        .recipients
        .iter()
        .filter(|recipient| {
            let process = ctx.config.recipient_filter.should_process(recipient);
            if !process {
                debug!("Recipient: {} is filtered out", recipient);
            }
            process
        })
        .cloned()
        .collect();

    let snapshot = document.to_snapshot();
    let mut scheduled = Vec::new();
    let mut stale = 0;
    for recipient in &recipients {
        let alarm = AlarmEvent::new(
            event_uid.clone(),
            recipient.clone(),
            &instant,
            document.is_recurring(),
            path.to_string(),
            snapshot.clone(),
        );
        match save_alarm(&alarm, ctx).await? {
            WriteResult::Applied => scheduled.push(recipient.clone()),
            WriteResult::Ignored => {
                info!(
                    "Ignored alarm of event: {} for: {} with outdated sequence: {}",
                    event_uid, recipient, alarm.sequence
                );
                stale += 1;
            }
        }
    }

    // Recipients dropped from the event lose their alarm, unless a newer
    // revision of the event is already stored for them
    let dropped: Vec<MailAddress> = stored
        .into_iter()
        .filter(|alarm| !recipients.contains(&alarm.recipient) && alarm.sequence <= instant.sequence)
        .map(|alarm| alarm.recipient)
        .collect();
    if !dropped.is_empty() {
        info!(
            "Removing alarms of event: {} for recipients no longer notified: {:?}",
            event_uid, dropped
        );
        remove_alarms(&event_uid, &dropped, ctx).await?;
    }

    Ok(AlarmOutcome::Scheduled {
        recipients: scheduled,
        stale,
    })
}

async fn find_stored_alarms(
    event_uid: &EventUid,
    ctx: &AlarmContext,
) -> Result<Vec<AlarmEvent>, UseCaseError> {
    ctx.repos
        .alarm_events
        .find_by_event(event_uid)
        .await
        .map_err(|e| {
            error!("Unable to read alarms of event: {}. Err: {:?}", event_uid, e);
            UseCaseError::StorageError
        })
}

async fn save_alarm(alarm: &AlarmEvent, ctx: &AlarmContext) -> Result<WriteResult, UseCaseError> {
    let existing = ctx
        .repos
        .alarm_events
        .find(&alarm.event_uid, &alarm.recipient)
        .await
        .map_err(|e| {
            error!("Unable to read alarm of event: {}. Err: {:?}", alarm.event_uid, e);
            UseCaseError::StorageError
        })?;

    let res = match existing {
        None => ctx.repos.alarm_events.create(alarm).await,
        Some(_) => ctx.repos.alarm_events.update(alarm).await,
    };
    res.map_err(|e| {
        error!("Unable to store alarm of event: {}. Err: {:?}", alarm.event_uid, e);
        UseCaseError::StorageError
    })
}

async fn delete(
    message: &CalendarAlarmMessageDTO,
    owner: &User,
    ctx: &AlarmContext,
) -> Result<AlarmOutcome, UseCaseError> {
    let event_uid = EventUid::new(
        extract_event_uid(&message.event).map_err(|e| UseCaseError::InvalidEvent(e.to_string()))?,
    );
    let recipients = match parse_jcal(&message.event) {
        Ok(document) => alarm_recipients(&document, owner),
        Err(_) => vec![owner.email.clone()],
    };
    remove_alarms(&event_uid, &recipients, ctx).await?;

    Ok(AlarmOutcome::Removed { recipients })
}

async fn remove_alarms(
    event_uid: &EventUid,
    recipients: &[MailAddress],
    ctx: &AlarmContext,
) -> Result<(), UseCaseError> {
    for recipient in recipients {
        ctx.repos
            .alarm_events
            .delete(event_uid, recipient)
            .await
            .map_err(|e| {
                error!(
                    "Unable to delete alarm of event: {} for: {}. Err: {:?}",
                    event_uid, recipient, e
                );
                UseCaseError::StorageError
            })?;
    }
    Ok(())
}
