use super::{IAlarmEventRepo, WriteResult};
use crate::repos::shared::inmemory_repo::*;
use calendar_alarms_domain::{AlarmEvent, EventUid, MailAddress};
use chrono::{DateTime, Utc};

pub struct InMemoryAlarmEventRepo {
    alarm_events: std::sync::Mutex<Vec<AlarmEvent>>,
}

impl InMemoryAlarmEventRepo {
    pub fn new() -> Self {
        Self {
            alarm_events: std::sync::Mutex::new(vec![]),
        }
    }
}

fn same_key(a: &AlarmEvent, event_uid: &EventUid, recipient: &MailAddress) -> bool {
    a.event_uid == *event_uid && a.recipient == *recipient
}

fn write_result(applied: bool) -> WriteResult {
    if applied {
        WriteResult::Applied
    } else {
        WriteResult::Ignored
    }
}

#[async_trait::async_trait]
impl IAlarmEventRepo for InMemoryAlarmEventRepo {
    async fn find(
        &self,
        event_uid: &EventUid,
        recipient: &MailAddress,
    ) -> anyhow::Result<Option<AlarmEvent>> {
        Ok(find_one_by(&self.alarm_events, |a| {
            same_key(a, event_uid, recipient)
        }))
    }

    async fn find_by_event(&self, event_uid: &EventUid) -> anyhow::Result<Vec<AlarmEvent>> {
        Ok(find_by(&self.alarm_events, |a| a.event_uid == *event_uid))
    }

    async fn create(&self, alarm: &AlarmEvent) -> anyhow::Result<WriteResult> {
        let applied = upsert_if(
            alarm,
            &self.alarm_events,
            |a| same_key(a, &alarm.event_uid, &alarm.recipient),
            |existing| existing.sequence <= alarm.sequence,
        );
        Ok(write_result(applied))
    }

    async fn update(&self, alarm: &AlarmEvent) -> anyhow::Result<WriteResult> {
        let applied = replace_if(
            alarm,
            &self.alarm_events,
            |a| same_key(a, &alarm.event_uid, &alarm.recipient),
            |existing| existing.sequence <= alarm.sequence,
        );
        Ok(write_result(applied))
    }

    async fn delete(&self, event_uid: &EventUid, recipient: &MailAddress) -> anyhow::Result<()> {
        delete_by(&self.alarm_events, |a| same_key(a, event_uid, recipient));
        Ok(())
    }

    async fn find_alarms_to_trigger(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<AlarmEvent>> {
        let mut due = find_by(&self.alarm_events, |a| a.alarm_time <= now);
        due.sort_by_key(|a| a.alarm_time);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }
}
