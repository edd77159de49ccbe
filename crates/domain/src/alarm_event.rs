use crate::{alarm_instant::AlarmInstant, shared::mail_address::MailAddress};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Stable identifier (UID) of a calendar event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventUid(String);

impl EventUid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EventUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventUid {
    fn from(uid: &str) -> Self {
        Self::new(uid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlarmAction {
    Email,
    Display,
}

impl AlarmAction {
    /// Actions this service delivers. AUDIO and PROCEDURE alarms are client side.
    pub fn from_ics_str(action: &str) -> Option<Self> {
        match action.trim().to_uppercase().as_str() {
            "EMAIL" => Some(Self::Email),
            "DISPLAY" => Some(Self::Display),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Display => "DISPLAY",
        }
    }
}

/// The currently scheduled alarm of a recipient for an event. There is at
/// most one per (`event_uid`, `recipient`).
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmEvent {
    pub event_uid: EventUid,
    pub recipient: MailAddress,
    /// When the reminder is due
    pub alarm_time: DateTime<Utc>,
    /// Start of the occurrence the reminder refers to
    pub event_start_time: DateTime<Utc>,
    pub recurring: bool,
    /// Set when the alarm refers to one instance of a recurring series
    pub recurrence_id: Option<String>,
    pub action: AlarmAction,
    /// SEQUENCE of the event this alarm was computed from. A store never
    /// replaces a row with one carrying a lower sequence.
    pub sequence: i64,
    /// Path of the event in the calendar store
    pub event_path: String,
    /// Snapshot of the event document used to render the reminder
    pub raw_event_data: String,
}

impl AlarmEvent {
    pub fn new(
        event_uid: EventUid,
        recipient: MailAddress,
        instant: &AlarmInstant,
        recurring: bool,
        event_path: String,
        raw_event_data: String,
    ) -> Self {
        Self {
            event_uid,
            recipient,
            alarm_time: instant.alarm_time,
            event_start_time: instant.event_start_time,
            recurring,
            recurrence_id: instant.recurrence_id.clone(),
            action: instant.action,
            sequence: instant.sequence,
            event_path,
            raw_event_data,
        }
    }

    /// The same alarm moved to the next occurrence of a recurring series
    pub fn reschedule(&self, instant: &AlarmInstant) -> Self {
        Self {
            alarm_time: instant.alarm_time,
            event_start_time: instant.event_start_time,
            recurrence_id: instant.recurrence_id.clone(),
            action: instant.action,
            ..self.clone()
        }
    }

    /// Whether the alarm came due more than `grace` before `now`. Such an
    /// alarm is dropped instead of sent.
    pub fn is_overdue(&self, now: &DateTime<Utc>, grace: Duration) -> bool {
        self.alarm_time + grace < *now
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_supported_actions() {
        assert_eq!(AlarmAction::from_ics_str("EMAIL"), Some(AlarmAction::Email));
        assert_eq!(
            AlarmAction::from_ics_str(" display"),
            Some(AlarmAction::Display)
        );
        assert_eq!(AlarmAction::from_ics_str("AUDIO"), None);
    }

    #[test]
    fn reschedule_keeps_identity() {
        let instant = AlarmInstant {
            alarm_time: Utc.with_ymd_and_hms(2025, 3, 10, 8, 45, 0).unwrap(),
            event_start_time: Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
            recurrence_id: Some("20250310T090000Z".into()),
            recipients: vec![],
            action: AlarmAction::Email,
            sequence: 2,
        };
        let alarm = AlarmEvent::new(
            "uid".into(),
            "bob@example.com".parse().unwrap(),
            &instant,
            true,
            "/calendars/h/c/uid.ics".into(),
            "{}".into(),
        );
        let next = AlarmInstant {
            alarm_time: Utc.with_ymd_and_hms(2025, 3, 17, 8, 45, 0).unwrap(),
            event_start_time: Utc.with_ymd_and_hms(2025, 3, 17, 9, 0, 0).unwrap(),
            recurrence_id: Some("20250317T090000Z".into()),
            ..instant.clone()
        };
        let rescheduled = alarm.reschedule(&next);
        assert_eq!(rescheduled.event_uid, alarm.event_uid);
        assert_eq!(rescheduled.recipient, alarm.recipient);
        assert_eq!(rescheduled.alarm_time, next.alarm_time);
        assert_eq!(rescheduled.recurrence_id, next.recurrence_id);

        let grace = Duration::minutes(15);
        assert!(!alarm.is_overdue(&Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(), grace));
        assert!(alarm.is_overdue(&Utc.with_ymd_and_hms(2025, 3, 10, 9, 1, 0).unwrap(), grace));
        assert!(!rescheduled.is_overdue(&Utc.with_ymd_and_hms(2025, 3, 10, 9, 1, 0).unwrap(), grace));
    }
}
