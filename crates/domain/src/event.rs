use crate::shared::mail_address::MailAddress;
use chrono::{prelude::*, Duration};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A calendar object as stored by the calendar store: one or more `VEvent`s
/// sharing the same UID (a recurring master plus its overridden occurrences,
/// or a single event).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDocument {
    pub events: Vec<VEvent>,
}

impl EventDocument {
    pub fn uid(&self) -> Option<&str> {
        self.events.first().map(|e| e.uid.as_str())
    }

    pub fn is_recurring(&self) -> bool {
        self.events.iter().any(|e| e.rrule.is_some())
    }

    /// Highest SEQUENCE among the components
    pub fn sequence(&self) -> i64 {
        self.events.iter().map(|e| e.sequence).max().unwrap_or(0)
    }

    /// Serialized snapshot kept on the `AlarmEvent` to render the reminder later
    pub fn to_snapshot(&self) -> String {
        // Serializing plain data structs cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_snapshot(snapshot: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(snapshot)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VEvent {
    pub uid: String,
    pub start: EventTime,
    pub end: Option<EventTime>,
    /// Raw DURATION value, only consulted when `end` is absent
    pub duration: Option<String>,
    /// RRULE in its iCalendar text form, e.g. `FREQ=WEEKLY;COUNT=4`
    pub rrule: Option<String>,
    pub exdates: Vec<EventTime>,
    pub recurrence_id: Option<EventTime>,
    pub status: Option<EventStatus>,
    pub sequence: i64,
    pub summary: Option<String>,
    pub location: Option<String>,
    pub organizer: Option<Attendee>,
    pub attendees: Vec<Attendee>,
    pub alarms: Vec<VAlarm>,
}

impl VEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status == Some(EventStatus::Cancelled)
    }

    /// Whether `user` takes part in this event: organizer, accepted attendee,
    /// or the event has no attendees at all (personal event).
    pub fn has_accepted(&self, user: &MailAddress) -> bool {
        if self.attendees.is_empty() {
            return true;
        }
        if let Some(organizer) = &self.organizer {
            if &organizer.email == user {
                return true;
            }
        }
        self.attendees
            .iter()
            .any(|a| &a.email == user && a.partstat == Some(PartStat::Accepted))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Tentative,
    Confirmed,
    Cancelled,
}

impl EventStatus {
    pub fn from_ics_str(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "TENTATIVE" => Some(Self::Tentative),
            "CONFIRMED" => Some(Self::Confirmed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: MailAddress,
    pub name: Option<String>,
    pub partstat: Option<PartStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum PartStat {
    NeedsAction,
    Accepted,
    Declined,
    Tentative,
    Delegated,
}

impl PartStat {
    pub fn from_ics_str(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "NEEDS-ACTION" => Some(Self::NeedsAction),
            "ACCEPTED" => Some(Self::Accepted),
            "DECLINED" => Some(Self::Declined),
            "TENTATIVE" => Some(Self::Tentative),
            "DELEGATED" => Some(Self::Delegated),
            _ => None,
        }
    }
}

/// A VALARM component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VAlarm {
    pub action: Option<String>,
    pub trigger: Option<AlarmTrigger>,
    /// Raw ATTENDEE values (`mailto:` addresses)
    pub attendees: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlarmTrigger {
    /// Offset such as `-PT15M`, relative to the start or the end of the occurrence
    Relative {
        duration: String,
        related: TriggerRelation,
    },
    /// TRIGGER;VALUE=DATE-TIME
    Absolute(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TriggerRelation {
    Start,
    End,
}

/// A DTSTART / DTEND / EXDATE / RECURRENCE-ID value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventTime {
    /// All-day value
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    /// Date-time without `Z` suffix or TZID
    DateTimeFloating(NaiveDateTime),
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    pub fn is_date(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// Resolves the value to an instant. All-day values are anchored at local
    /// midnight in `default_tz`; floating values and unknown TZIDs fall back to UTC.
    pub fn to_utc(&self, default_tz: &Tz) -> DateTime<Utc> {
        match self {
            EventTime::Date(date) => localize(default_tz, &date.and_time(NaiveTime::MIN)),
            EventTime::DateTimeUtc(dt) => *dt,
            EventTime::DateTimeFloating(dt) => Utc.from_utc_datetime(dt),
            EventTime::DateTimeZoned { datetime, tzid } => match tzid.parse::<Tz>() {
                Ok(tz) => localize(&tz, datetime),
                Err(_) => {
                    warn!("Unknown TZID: {}, falling back to UTC", tzid);
                    Utc.from_utc_datetime(datetime)
                }
            },
        }
    }

    /// iCalendar text form, e.g. `20250310T090000Z` or `20250310`
    pub fn to_ics_string(&self) -> String {
        match self {
            EventTime::Date(d) => d.format("%Y%m%d").to_string(),
            EventTime::DateTimeUtc(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
            EventTime::DateTimeFloating(dt) => dt.format("%Y%m%dT%H%M%S").to_string(),
            EventTime::DateTimeZoned { datetime, .. } => {
                datetime.format("%Y%m%dT%H%M%S").to_string()
            }
        }
    }

    /// Same variant as `self`, moved to the instant `dt`
    pub fn with_instant(&self, dt: &DateTime<Utc>, default_tz: &Tz) -> EventTime {
        match self {
            EventTime::Date(_) => EventTime::Date(dt.with_timezone(default_tz).date_naive()),
            EventTime::DateTimeUtc(_) => EventTime::DateTimeUtc(*dt),
            EventTime::DateTimeFloating(_) => EventTime::DateTimeFloating(dt.naive_utc()),
            EventTime::DateTimeZoned { tzid, .. } => {
                let datetime = match tzid.parse::<Tz>() {
                    Ok(tz) => dt.with_timezone(&tz).naive_local(),
                    Err(_) => dt.naive_utc(),
                };
                EventTime::DateTimeZoned {
                    datetime,
                    tzid: tzid.clone(),
                }
            }
        }
    }
}

/// Local wall-clock time to instant. Ambiguous times take the earliest
/// mapping, times inside a DST gap are pushed forward by one hour.
pub fn localize(tz: &Tz, local: &NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(local)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(*local + Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(local))
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono_tz::{Europe::Paris, UTC};

    fn ndt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[test]
    fn all_day_is_anchored_at_local_midnight() {
        let date = EventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(
            date.to_utc(&UTC),
            Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap()
        );
        assert_eq!(
            date.to_utc(&Paris),
            Utc.with_ymd_and_hms(2025, 3, 9, 23, 0, 0).unwrap()
        );
    }

    #[test]
    fn zoned_date_time_respects_tzid() {
        let time = EventTime::DateTimeZoned {
            datetime: ndt("2025-07-01T09:00:00"),
            tzid: "Europe/Paris".into(),
        };
        assert_eq!(
            time.to_utc(&UTC),
            Utc.with_ymd_and_hms(2025, 7, 1, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn unknown_tzid_and_floating_fall_back_to_utc() {
        let zoned = EventTime::DateTimeZoned {
            datetime: ndt("2025-07-01T09:00:00"),
            tzid: "Mars/Olympus".into(),
        };
        let floating = EventTime::DateTimeFloating(ndt("2025-07-01T09:00:00"));
        let expected = Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap();
        assert_eq!(zoned.to_utc(&Paris), expected);
        assert_eq!(floating.to_utc(&Paris), expected);
    }

    #[test]
    fn dst_gap_is_pushed_forward() {
        // 02:30 does not exist in Paris on 2025-03-30
        let time = EventTime::DateTimeZoned {
            datetime: ndt("2025-03-30T02:30:00"),
            tzid: "Europe/Paris".into(),
        };
        assert_eq!(
            time.to_utc(&UTC),
            Utc.with_ymd_and_hms(2025, 3, 30, 1, 30, 0).unwrap()
        );
    }

    #[test]
    fn formats_ics_strings() {
        assert_eq!(
            EventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()).to_ics_string(),
            "20250310"
        );
        assert_eq!(
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap())
                .to_ics_string(),
            "20250310T090000Z"
        );
        assert_eq!(
            EventTime::DateTimeZoned {
                datetime: ndt("2025-03-10T09:00:00"),
                tzid: "Europe/Paris".into()
            }
            .to_ics_string(),
            "20250310T090000"
        );
    }

    #[test]
    fn acceptance_rules() {
        let bob: MailAddress = "bob@example.com".parse().unwrap();
        let alice: MailAddress = "alice@example.com".parse().unwrap();
        let mut event = VEvent {
            uid: "uid".into(),
            start: EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()),
            end: None,
            duration: None,
            rrule: None,
            exdates: vec![],
            recurrence_id: None,
            status: None,
            sequence: 0,
            summary: None,
            location: None,
            organizer: None,
            attendees: vec![],
            alarms: vec![],
        };
        assert!(event.has_accepted(&bob));

        event.organizer = Some(Attendee {
            email: alice.clone(),
            name: None,
            partstat: None,
        });
        event.attendees = vec![Attendee {
            email: bob.clone(),
            name: None,
            partstat: Some(PartStat::NeedsAction),
        }];
        assert!(event.has_accepted(&alice));
        assert!(!event.has_accepted(&bob));

        event.attendees[0].partstat = Some(PartStat::Accepted);
        assert!(event.has_accepted(&bob));
    }
}
