use calendar_alarms_domain::{AlarmAction, AlarmEvent, EventPath, InvalidEventPathError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of the messages published on the `calendar:event:alarm:*` exchanges
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarAlarmMessageDTO {
    pub event_path: String,
    /// The event as jCal
    pub event: Value,
    #[serde(default)]
    pub raw_event: Option<String>,
    #[serde(rename = "import", default)]
    pub is_import: bool,
}

impl CalendarAlarmMessageDTO {
    pub fn parse_event_path(&self) -> Result<EventPath, InvalidEventPathError> {
        self.event_path.parse()
    }
}

/// Payload POSTed to the reminder webhook when an alarm fires
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlarmReminderDTO {
    pub event_uid: String,
    pub recipient: String,
    pub action: AlarmAction,
    pub alarm_time: DateTime<Utc>,
    pub event_start_time: DateTime<Utc>,
    pub recurrence_id: Option<String>,
    pub event_path: String,
    /// Snapshot of the event the reminder was computed from
    pub event: Value,
}

impl AlarmReminderDTO {
    pub fn new(alarm: &AlarmEvent) -> Self {
        Self {
            event_uid: alarm.event_uid.to_string(),
            recipient: alarm.recipient.to_string(),
            action: alarm.action,
            alarm_time: alarm.alarm_time,
            event_start_time: alarm.event_start_time,
            recurrence_id: alarm.recurrence_id.clone(),
            event_path: alarm.event_path.clone(),
            event: serde_json::from_str(&alarm.raw_event_data).unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_message_and_ignores_unknown_fields() {
        let message: CalendarAlarmMessageDTO = serde_json::from_value(json!({
            "eventPath": "/calendars/home1/cal1/event1.ics",
            "event": ["vcalendar", [], []],
            "import": true,
            "etag": "\"abc\""
        }))
        .unwrap();
        assert!(message.is_import);
        assert_eq!(message.raw_event, None);
        let path = message.parse_event_path().unwrap();
        assert_eq!(path.calendar_home_id, "home1");

        let message: CalendarAlarmMessageDTO = serde_json::from_value(json!({
            "eventPath": "/calendars/home1/cal1/event1.ics",
            "event": [],
            "rawEvent": "BEGIN:VCALENDAR"
        }))
        .unwrap();
        assert!(!message.is_import);
        assert_eq!(message.raw_event.as_deref(), Some("BEGIN:VCALENDAR"));
    }

    #[test]
    fn rejects_message_without_event_path() {
        assert!(serde_json::from_value::<CalendarAlarmMessageDTO>(json!({"event": []})).is_err());
    }
}
