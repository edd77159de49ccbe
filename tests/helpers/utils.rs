use serde_json::{json, Value};
use std::{future::Future, time::Duration};

/// Polls `condition` until it holds or two seconds have passed
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// jCal of a meeting at 09:00 UTC on the first day of the test clock with a
/// reminder 15 minutes before
pub fn meeting() -> Value {
    json!(["vcalendar", [], [
        ["vevent", [
            ["uid", {}, "text", "meeting"],
            ["dtstart", {}, "date-time", "2025-03-10T09:00:00Z"],
            ["dtend", {}, "date-time", "2025-03-10T10:00:00Z"],
            ["summary", {}, "text", "Planning"]
        ], [
            ["valarm", [
                ["action", {}, "text", "EMAIL"],
                ["trigger", {}, "duration", "-PT15M"]
            ], []]
        ]]
    ]])
}

pub fn notification(event_path: &str, event: Value) -> Vec<u8> {
    json!({
        "eventPath": event_path,
        "event": event,
        "import": false
    })
    .to_string()
    .into_bytes()
}
