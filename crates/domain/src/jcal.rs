//! Extraction of the typed event document from jCal (RFC 7265).
//!
//! A jCal component is `[name, [properties], [subcomponents]]` and a property
//! is `[name, {parameters}, type, value, ...]`.

use crate::event::{
    AlarmTrigger, Attendee, EventDocument, EventStatus, EventTime, PartStat, TriggerRelation,
    VAlarm, VEvent,
};
use crate::shared::mail_address::MailAddress;
use chrono::prelude::*;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, PartialEq)]
pub enum JCalError {
    #[error("Not a jCal component")]
    NotAComponent,
    #[error("Calendar does not contain any VEVENT")]
    NoEvent,
    #[error("VEVENT is missing required property: {0}")]
    MissingProperty(&'static str),
    #[error("Invalid value for property: {property}: {value}")]
    InvalidValue { property: String, value: String },
}

/// Parses a `vcalendar` (or a bare `vevent`) jCal value
pub fn parse_jcal(value: &Value) -> Result<EventDocument, JCalError> {
    let root = Component::from_value(value)?;
    let vevents: Vec<Component> = if root.name.eq_ignore_ascii_case("vevent") {
        vec![root]
    } else {
        root.subcomponents("vevent")
    };
    if vevents.is_empty() {
        return Err(JCalError::NoEvent);
    }

    let events = vevents
        .iter()
        .map(parse_vevent)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(EventDocument { events })
}

/// Reads only the UID of the first VEVENT
pub fn extract_event_uid(value: &Value) -> Result<String, JCalError> {
    let root = Component::from_value(value)?;
    let vevent = if root.name.eq_ignore_ascii_case("vevent") {
        root
    } else {
        root.subcomponents("vevent")
            .into_iter()
            .next()
            .ok_or(JCalError::NoEvent)?
    };
    vevent
        .property("uid")
        .and_then(|p| p.text())
        .map(String::from)
        .ok_or(JCalError::MissingProperty("UID"))
}

struct Component<'a> {
    name: &'a str,
    properties: Vec<Property<'a>>,
    components: &'a [Value],
}

impl<'a> Component<'a> {
    fn from_value(value: &'a Value) -> Result<Self, JCalError> {
        let parts = value.as_array().ok_or(JCalError::NotAComponent)?;
        let name = parts
            .first()
            .and_then(Value::as_str)
            .ok_or(JCalError::NotAComponent)?;
        let properties = match parts.get(1) {
            Some(Value::Array(props)) => props.iter().filter_map(Property::from_value).collect(),
            _ => Vec::new(),
        };
        let components: &'a [Value] = match parts.get(2) {
            Some(Value::Array(components)) => components.as_slice(),
            _ => &[],
        };
        Ok(Self {
            name,
            properties,
            components,
        })
    }

    fn subcomponents(&self, name: &str) -> Vec<Component<'a>> {
        self.components
            .iter()
            .filter_map(|c| Component::from_value(c).ok())
            .filter(|c| c.name.eq_ignore_ascii_case(name))
            .collect()
    }

    fn property(&self, name: &str) -> Option<&Property<'a>> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    fn all_properties<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s Property<'a>> {
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
    }
}

struct Property<'a> {
    name: &'a str,
    params: Option<&'a Map<String, Value>>,
    value_type: &'a str,
    values: &'a [Value],
}

impl<'a> Property<'a> {
    fn from_value(value: &'a Value) -> Option<Self> {
        let parts = value.as_array()?;
        if parts.len() < 4 {
            return None;
        }
        Some(Self {
            name: parts[0].as_str()?,
            params: parts[1].as_object(),
            value_type: parts[2].as_str().unwrap_or("unknown"),
            values: &parts[3..],
        })
    }

    fn param(&self, name: &str) -> Option<&'a str> {
        self.params?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_str())
    }

    fn text(&self) -> Option<&'a str> {
        self.values.first().and_then(Value::as_str)
    }

    fn invalid(&self, value: &str) -> JCalError {
        JCalError::InvalidValue {
            property: self.name.to_uppercase(),
            value: value.to_string(),
        }
    }

    fn time_values(&self) -> Result<Vec<EventTime>, JCalError> {
        self.values
            .iter()
            .map(|v| {
                let text = v.as_str().ok_or_else(|| self.invalid(&v.to_string()))?;
                parse_time(text, self.value_type, self.param("tzid"))
                    .ok_or_else(|| self.invalid(text))
            })
            .collect()
    }

    fn time(&self) -> Result<EventTime, JCalError> {
        self.time_values()?
            .into_iter()
            .next()
            .ok_or_else(|| self.invalid(""))
    }
}

fn parse_time(text: &str, value_type: &str, tzid: Option<&str>) -> Option<EventTime> {
    if value_type.eq_ignore_ascii_case("date") || text.len() == 10 {
        return NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(EventTime::Date);
    }
    if let Some(utc) = text.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(utc, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .map(|dt| EventTime::DateTimeUtc(Utc.from_utc_datetime(&dt)));
    }
    let datetime = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").ok()?;
    Some(match tzid {
        Some(tzid) => EventTime::DateTimeZoned {
            datetime,
            tzid: tzid.to_string(),
        },
        None => EventTime::DateTimeFloating(datetime),
    })
}

fn parse_vevent(vevent: &Component) -> Result<VEvent, JCalError> {
    let uid = vevent
        .property("uid")
        .and_then(|p| p.text())
        .ok_or(JCalError::MissingProperty("UID"))?
        .to_string();
    let start = vevent
        .property("dtstart")
        .ok_or(JCalError::MissingProperty("DTSTART"))?
        .time()?;
    let end = vevent.property("dtend").map(|p| p.time()).transpose()?;
    let recurrence_id = vevent
        .property("recurrence-id")
        .map(|p| p.time())
        .transpose()?;

    let mut exdates = Vec::new();
    for exdate in vevent.all_properties("exdate") {
        exdates.extend(exdate.time_values()?);
    }

    let rrule = vevent.property("rrule").map(recur_to_rrule).transpose()?;

    let sequence = match vevent.property("sequence").and_then(|p| p.values.first()) {
        None => 0,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| JCalError::InvalidValue {
            property: "SEQUENCE".into(),
            value: s.clone(),
        })?,
        Some(other) => {
            return Err(JCalError::InvalidValue {
                property: "SEQUENCE".into(),
                value: other.to_string(),
            })
        }
    };

    let attendees = vevent
        .all_properties("attendee")
        .filter_map(parse_attendee)
        .collect();
    let organizer = vevent.property("organizer").and_then(parse_attendee);

    let alarms = vevent
        .subcomponents("valarm")
        .iter()
        .map(parse_valarm)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(VEvent {
        uid,
        start,
        end,
        duration: vevent
            .property("duration")
            .and_then(|p| p.text())
            .map(String::from),
        rrule,
        exdates,
        recurrence_id,
        status: vevent
            .property("status")
            .and_then(|p| p.text())
            .and_then(EventStatus::from_ics_str),
        sequence,
        summary: vevent
            .property("summary")
            .and_then(|p| p.text())
            .map(String::from),
        location: vevent
            .property("location")
            .and_then(|p| p.text())
            .map(String::from),
        organizer,
        attendees,
        alarms,
    })
}

fn parse_attendee(property: &Property) -> Option<Attendee> {
    let value = property.text()?;
    match MailAddress::from_cal_address(value) {
        Ok(email) => Some(Attendee {
            email,
            name: property.param("cn").map(String::from),
            partstat: property.param("partstat").and_then(PartStat::from_ics_str),
        }),
        Err(e) => {
            warn!("Ignoring {}: {}", property.name, e);
            None
        }
    }
}

fn parse_valarm(valarm: &Component) -> Result<VAlarm, JCalError> {
    let trigger = match valarm.property("trigger") {
        None => None,
        Some(p) if p.value_type.eq_ignore_ascii_case("date-time") => match p.time()? {
            EventTime::DateTimeUtc(dt) => Some(AlarmTrigger::Absolute(dt)),
            _ => return Err(p.invalid(p.text().unwrap_or_default())),
        },
        Some(p) => {
            let duration = p.text().ok_or_else(|| p.invalid(""))?;
            let related = match p.param("related") {
                Some(r) if r.eq_ignore_ascii_case("end") => TriggerRelation::End,
                _ => TriggerRelation::Start,
            };
            Some(AlarmTrigger::Relative {
                duration: duration.to_string(),
                related,
            })
        }
    };

    Ok(VAlarm {
        action: valarm
            .property("action")
            .and_then(|p| p.text())
            .map(String::from),
        trigger,
        attendees: valarm
            .all_properties("attendee")
            .filter_map(|p| p.text())
            .map(String::from)
            .collect(),
        description: valarm
            .property("description")
            .and_then(|p| p.text())
            .map(String::from),
    })
}

/// Converts a jCal `recur` value to its iCalendar text form. `FREQ` comes
/// first and UNTIL is reduced to the basic format.
fn recur_to_rrule(property: &Property) -> Result<String, JCalError> {
    let recur = match property.values.first() {
        Some(Value::Object(recur)) => recur,
        // Some producers send the text form directly
        Some(Value::String(text)) => return Ok(text.clone()),
        other => {
            return Err(property.invalid(&other.map(Value::to_string).unwrap_or_default()))
        }
    };

    let mut parts = Vec::new();
    if let Some(freq) = recur.get("freq").and_then(Value::as_str) {
        parts.push(format!("FREQ={}", freq.to_uppercase()));
    } else {
        return Err(property.invalid(&Value::Object(recur.clone()).to_string()));
    }
    for (key, value) in recur {
        if key.eq_ignore_ascii_case("freq") {
            continue;
        }
        let rendered = match value {
            Value::Array(items) => items
                .iter()
                .map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(","),
            other => scalar_to_string(other),
        };
        let rendered = if key.eq_ignore_ascii_case("until") {
            rendered.replace(['-', ':'], "")
        } else {
            rendered
        };
        parts.push(format!("{}={}", key.to_uppercase(), rendered));
    }
    Ok(parts.join(";"))
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
