use std::{fmt::Display, str::FromStr};
use thiserror::Error;

/// Location of an event in the calendar store:
/// `/calendars/{calendar_home_id}/{calendar_id}/{event_file}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPath {
    /// Identifies the owning user
    pub calendar_home_id: String,
    pub calendar_id: String,
    pub event_file: String,
}

impl Display for EventPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "/calendars/{}/{}/{}",
            self.calendar_home_id, self.calendar_id, self.event_file
        )
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum InvalidEventPathError {
    #[error("Event path: {0} is malformed")]
    Malformed(String),
}

impl FromStr for EventPath {
    type Err = InvalidEventPathError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            ["calendars", home, calendar, file]
                if !home.is_empty() && !calendar.is_empty() && !file.is_empty() =>
            {
                Ok(Self {
                    calendar_home_id: home.to_string(),
                    calendar_id: calendar.to_string(),
                    event_file: file.to_string(),
                })
            }
            _ => Err(InvalidEventPathError::Malformed(path.to_string())),
        }
    }
}
