use crate::alarm_event::AlarmEvent;
use chrono::{DateTime, Utc};
use std::fmt::Display;
use thiserror::Error;

/// Identity of a lease, shared by every worker racing on the same alarm
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseKey(String);

impl LeaseKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// `uid|recipient`, suffixed with `|recurrence_id` for occurrences of a series
    pub fn for_alarm(alarm: &AlarmEvent) -> Self {
        match &alarm.recurrence_id {
            Some(recurrence_id) => Self(format!(
                "{}|{}|{}",
                alarm.event_uid, alarm.recipient, recurrence_id
            )),
            None => Self(format!("{}|{}", alarm.event_uid, alarm.recipient)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LeaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub key: LeaseKey,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: &DateTime<Utc>) -> bool {
        self.expires_at <= *now
    }
}

#[derive(Error, Debug)]
pub enum LeaseError {
    /// Another worker holds a non-expired lease on the key
    #[error("Lease: {0} is already held")]
    AlreadyHeld(LeaseKey),
    #[error("Lease storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}
