//! Occurrence expansion for calendar objects.
//!
//! A recurring calendar object is a master `VEvent` carrying an RRULE plus any
//! number of overridden instances identified by their RECURRENCE-ID. Expansion
//! yields the concrete occurrences within a bounded window, with overrides
//! replacing the generated instance they refer to and EXDATEs removed.

use crate::event::{EventDocument, EventTime, VEvent};
use crate::trigger::parse_duration;
use chrono::{prelude::*, Duration};
use chrono_tz::Tz;
use rrule::RRuleSet;
use std::collections::HashMap;
use thiserror::Error;

/// Upper bound on generated occurrences for a single expansion
pub const MAX_OCCURRENCES: u16 = 1000;

#[derive(Error, Debug, PartialEq)]
pub enum RecurrenceError {
    #[error("Invalid recurrence rule for event: {uid}: {reason}")]
    InvalidRule { uid: String, reason: String },
    #[error("Invalid duration for event: {uid}: {reason}")]
    InvalidDuration { uid: String, reason: String },
}

/// One concrete instance in time of an event
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence<'a> {
    /// The component describing this occurrence: the master for generated
    /// instances, the override otherwise
    pub event: &'a VEvent,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// RECURRENCE-ID in iCalendar text form, absent for non-recurring events
    pub recurrence_id: Option<String>,
}

/// Resolves the end of a component: DTEND, then DURATION, then one day for
/// all-day events, else the start itself.
pub fn event_end(event: &VEvent, default_tz: &Tz) -> Result<DateTime<Utc>, RecurrenceError> {
    let start = event.start.to_utc(default_tz);
    if let Some(end) = &event.end {
        return Ok(end.to_utc(default_tz));
    }
    if let Some(duration) = &event.duration {
        let duration = parse_duration(duration).map_err(|e| RecurrenceError::InvalidDuration {
            uid: event.uid.clone(),
            reason: e.to_string(),
        })?;
        return Ok(start + duration);
    }
    if event.start.is_date() {
        return Ok(start + Duration::days(1));
    }
    Ok(start)
}

/// Expands `document` into its occurrences starting in `(after, before]`,
/// sorted by start. A document without any RRULE yields its components as is.
pub fn expand_occurrences<'a>(
    document: &'a EventDocument,
    after: DateTime<Utc>,
    before: DateTime<Utc>,
    default_tz: &Tz,
) -> Result<Vec<Occurrence<'a>>, RecurrenceError> {
    let master = match document.events.iter().find(|e| e.rrule.is_some()) {
        Some(master) => master,
        None => {
            let mut occurrences = Vec::new();
            for event in &document.events {
                let start = event.start.to_utc(default_tz);
                if start > after && start <= before {
                    occurrences.push(Occurrence {
                        event,
                        start,
                        end: event_end(event, default_tz)?,
                        recurrence_id: None,
                    });
                }
            }
            occurrences.sort_by_key(|o| o.start);
            return Ok(occurrences);
        }
    };

    let overrides: HashMap<DateTime<Utc>, &VEvent> = document
        .events
        .iter()
        .filter_map(|e| {
            e.recurrence_id
                .as_ref()
                .map(|rid| (rid.to_utc(default_tz), e))
        })
        .collect();
    let exdates: Vec<DateTime<Utc>> = master
        .exdates
        .iter()
        .map(|d| d.to_utc(default_tz))
        .collect();

    let master_start = master.start.to_utc(default_tz);
    let length = event_end(master, default_tz)? - master_start;

    let mut occurrences = Vec::new();
    for start in generate_instants(master, after, before, default_tz)? {
        if exdates.contains(&start) || overrides.contains_key(&start) {
            continue;
        }
        occurrences.push(Occurrence {
            event: master,
            start,
            end: start + length,
            recurrence_id: Some(master.start.with_instant(&start, default_tz).to_ics_string()),
        });
    }

    for (recurrence_instant, event) in &overrides {
        if exdates.contains(recurrence_instant) {
            continue;
        }
        let start = event.start.to_utc(default_tz);
        if start <= after || start > before {
            continue;
        }
        occurrences.push(Occurrence {
            event,
            start,
            end: event_end(event, default_tz)?,
            recurrence_id: event.recurrence_id.as_ref().map(EventTime::to_ics_string),
        });
    }

    occurrences.sort_by_key(|o| o.start);
    Ok(occurrences)
}

fn generate_instants(
    master: &VEvent,
    after: DateTime<Utc>,
    before: DateTime<Utc>,
    default_tz: &Tz,
) -> Result<Vec<DateTime<Utc>>, RecurrenceError> {
    let rule = match &master.rrule {
        Some(rule) => rule,
        None => return Ok(Vec::new()),
    };
    let rrule_str = format!(
        "{}\nRRULE:{}",
        dtstart_line(&master.start, default_tz),
        normalize_until(rule)
    );
    let rrule_set: RRuleSet = rrule_str
        .parse()
        .map_err(|e: rrule::RRuleError| RecurrenceError::InvalidRule {
            uid: master.uid.clone(),
            reason: e.to_string(),
        })?;

    // after/before are exclusive
    let tz: rrule::Tz = Utc.into();
    let result = rrule_set
        .after(after.with_timezone(&tz))
        .before((before + Duration::seconds(1)).with_timezone(&tz))
        .all(MAX_OCCURRENCES);

    Ok(result
        .dates
        .iter()
        .map(|d| d.with_timezone(&Utc))
        .filter(|d| *d > after && *d <= before)
        .collect())
}

/// DTSTART line for the rrule parser. All-day values become local midnight in
/// the default time zone, floating values and unknown TZIDs are read as UTC.
fn dtstart_line(start: &EventTime, default_tz: &Tz) -> String {
    match start {
        EventTime::Date(d) if *default_tz == Tz::UTC => {
            format!("DTSTART:{}T000000Z", d.format("%Y%m%d"))
        }
        EventTime::Date(d) => format!(
            "DTSTART;TZID={}:{}T000000",
            default_tz.name(),
            d.format("%Y%m%d")
        ),
        EventTime::DateTimeUtc(dt) => format!("DTSTART:{}", dt.format("%Y%m%dT%H%M%SZ")),
        EventTime::DateTimeFloating(dt) => format!("DTSTART:{}Z", dt.format("%Y%m%dT%H%M%S")),
        EventTime::DateTimeZoned { datetime, tzid } => match tzid.parse::<Tz>() {
            Ok(_) => format!(
                "DTSTART;TZID={}:{}",
                tzid,
                datetime.format("%Y%m%dT%H%M%S")
            ),
            Err(_) => format!("DTSTART:{}Z", datetime.format("%Y%m%dT%H%M%S")),
        },
    }
}

/// The rrule parser wants UNTIL as a UTC date-time. Date values are widened to
/// the end of that day and floating date-times are read as UTC.
fn normalize_until(rule: &str) -> String {
    rule.split(';')
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => {
                let value = if value.len() == 8 {
                    format!("{}T235959Z", value)
                } else if !value.ends_with('Z') {
                    format!("{}Z", value)
                } else {
                    value.to_string()
                };
                format!("UNTIL={}", value)
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}
