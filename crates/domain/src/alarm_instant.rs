use crate::{
    alarm_event::AlarmAction,
    event::{AlarmTrigger, EventDocument, TriggerRelation, VAlarm},
    recurrence::{expand_occurrences, Occurrence, RecurrenceError},
    shared::mail_address::MailAddress,
    trigger::{parse_duration, InvalidTriggerError},
};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::warn;

/// The next due reminder of an event
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmInstant {
    pub alarm_time: DateTime<Utc>,
    pub event_start_time: DateTime<Utc>,
    pub recurrence_id: Option<String>,
    pub recipients: Vec<MailAddress>,
    pub action: AlarmAction,
    pub sequence: i64,
}

#[derive(Error, Debug, PartialEq)]
pub enum AlarmInstantError {
    #[error("Invalid alarm trigger on event: {uid}: {source}")]
    InvalidTrigger {
        uid: String,
        source: InvalidTriggerError,
    },
    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),
}

/// Computes the next instant at which a reminder of an event is due for a
/// recipient.
#[derive(Debug, Clone)]
pub struct AlarmInstantCalculator {
    default_tz: Tz,
    horizon: Duration,
}

impl AlarmInstantCalculator {
    pub fn new(default_tz: Tz) -> Self {
        Self {
            default_tz,
            horizon: Duration::days(365),
        }
    }

    /// Returns the earliest trigger strictly after `now` of the first upcoming
    /// occurrence `recipient` takes part in, or `None` if nothing is due within
    /// the expansion horizon.
    pub fn compute_next_alarm_instant(
        &self,
        document: &EventDocument,
        recipient: &MailAddress,
        now: DateTime<Utc>,
    ) -> Result<Option<AlarmInstant>, AlarmInstantError> {
        let candidates = self.candidate_document(document);
        let occurrences =
            expand_occurrences(&candidates, now, now + self.horizon, &self.default_tz)?;

        for occurrence in occurrences {
            if occurrence.event.is_cancelled() || !occurrence.event.has_accepted(recipient) {
                continue;
            }
            if let Some(instant) =
                self.next_trigger(&occurrence, recipient, now, document.sequence())?
            {
                return Ok(Some(instant));
            }
        }

        Ok(None)
    }

    /// Without a recurrence rule only the most recent revision counts
    fn candidate_document(&self, document: &EventDocument) -> EventDocument {
        if document.is_recurring() || document.events.len() <= 1 {
            return document.clone();
        }
        let latest = document
            .events
            .iter()
            .enumerate()
            .max_by_key(|(i, e)| (e.sequence, std::cmp::Reverse(*i)))
            .map(|(_, e)| e.clone());
        EventDocument {
            events: latest.into_iter().collect(),
        }
    }

    fn next_trigger(
        &self,
        occurrence: &Occurrence,
        recipient: &MailAddress,
        now: DateTime<Utc>,
        sequence: i64,
    ) -> Result<Option<AlarmInstant>, AlarmInstantError> {
        let mut best: Option<(DateTime<Utc>, AlarmAction, Vec<MailAddress>)> = None;

        for alarm in &occurrence.event.alarms {
            let action = match alarm.action.as_deref().and_then(AlarmAction::from_ics_str) {
                Some(action) => action,
                None => continue,
            };
            let trigger_time = match self.trigger_time(alarm, occurrence)? {
                Some(time) if time > now => time,
                _ => continue,
            };
            let recipients = alarm_recipients(alarm, recipient);

            let earlier = match &best {
                Some((time, _, _)) => trigger_time < *time,
                None => true,
            };
            if earlier {
                best = Some((trigger_time, action, recipients));
            } else if let Some((time, _, existing)) = &mut best {
                // Alarms due at the same instant share one record per recipient
                if *time == trigger_time {
                    for r in recipients {
                        if !existing.contains(&r) {
                            existing.push(r);
                        }
                    }
                }
            }
        }

        Ok(best.map(|(alarm_time, action, recipients)| AlarmInstant {
            alarm_time,
            event_start_time: occurrence.start,
            recurrence_id: occurrence.recurrence_id.clone(),
            recipients,
            action,
            sequence,
        }))
    }

    fn trigger_time(
        &self,
        alarm: &VAlarm,
        occurrence: &Occurrence,
    ) -> Result<Option<DateTime<Utc>>, AlarmInstantError> {
        match &alarm.trigger {
            None => Ok(None),
            Some(AlarmTrigger::Absolute(time)) => Ok(Some(*time)),
            Some(AlarmTrigger::Relative { duration, related }) => {
                let offset =
                    parse_duration(duration).map_err(|source| AlarmInstantError::InvalidTrigger {
                        uid: occurrence.event.uid.clone(),
                        source,
                    })?;
                let anchor = match related {
                    TriggerRelation::Start => occurrence.start,
                    TriggerRelation::End => occurrence.end,
                };
                Ok(Some(anchor + offset))
            }
        }
    }
}

/// Recipients named on the VALARM, or the owner when it names none
fn alarm_recipients(alarm: &VAlarm, owner: &MailAddress) -> Vec<MailAddress> {
    let mut recipients: Vec<MailAddress> = Vec::new();
    for attendee in &alarm.attendees {
        match MailAddress::from_cal_address(attendee) {
            Ok(address) if !recipients.contains(&address) => recipients.push(address),
            Ok(_) => {}
            Err(e) => warn!("Ignoring alarm attendee: {}", e),
        }
    }
    if recipients.is_empty() {
        recipients.push(owner.clone());
    }
    recipients
}
