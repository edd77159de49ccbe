mod inmemory;
mod postgres;

use calendar_alarms_domain::{AlarmEvent, EventUid, MailAddress};
use chrono::{DateTime, Utc};
pub use inmemory::InMemoryAlarmEventRepo;
pub use postgres::PostgresAlarmEventRepo;

/// Outcome of a conditional write
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteResult {
    Applied,
    /// The stored row carries a higher sequence, or there was no row to update
    Ignored,
}

/// Scheduled alarms, at most one per (event uid, recipient)
#[async_trait::async_trait]
pub trait IAlarmEventRepo: Send + Sync {
    async fn find(
        &self,
        event_uid: &EventUid,
        recipient: &MailAddress,
    ) -> anyhow::Result<Option<AlarmEvent>>;
    /// Every stored alarm of the event, one per recipient
    async fn find_by_event(&self, event_uid: &EventUid) -> anyhow::Result<Vec<AlarmEvent>>;
    /// Inserts the alarm, or replaces the existing row of the same key unless
    /// that row has a higher sequence
    async fn create(&self, alarm: &AlarmEvent) -> anyhow::Result<WriteResult>;
    /// Replaces the existing row of the same key unless it has a higher sequence
    async fn update(&self, alarm: &AlarmEvent) -> anyhow::Result<WriteResult>;
    /// Removing a missing key is not an error
    async fn delete(&self, event_uid: &EventUid, recipient: &MailAddress) -> anyhow::Result<()>;
    /// Alarms due at or before `now`, earliest first
    async fn find_alarms_to_trigger(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<AlarmEvent>>;
}
