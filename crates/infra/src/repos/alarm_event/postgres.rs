use super::{IAlarmEventRepo, WriteResult};
use calendar_alarms_domain::{AlarmAction, AlarmEvent, EventUid, MailAddress};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::convert::TryFrom;

pub struct PostgresAlarmEventRepo {
    pool: PgPool,
}

impl PostgresAlarmEventRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AlarmEventRaw {
    event_uid: String,
    recipient: String,
    alarm_time: DateTime<Utc>,
    event_start_time: DateTime<Utc>,
    recurring: bool,
    recurrence_id: Option<String>,
    action: String,
    sequence: i64,
    event_path: String,
    raw_event_data: String,
}

impl TryFrom<AlarmEventRaw> for AlarmEvent {
    type Error = anyhow::Error;

    fn try_from(raw: AlarmEventRaw) -> Result<Self, Self::Error> {
        let action = AlarmAction::from_ics_str(&raw.action)
            .ok_or_else(|| anyhow::anyhow!("Unknown alarm action: {}", raw.action))?;
        Ok(AlarmEvent {
            event_uid: EventUid::new(raw.event_uid),
            recipient: raw.recipient.parse()?,
            alarm_time: raw.alarm_time,
            event_start_time: raw.event_start_time,
            recurring: raw.recurring,
            recurrence_id: raw.recurrence_id,
            action,
            sequence: raw.sequence,
            event_path: raw.event_path,
            raw_event_data: raw.raw_event_data,
        })
    }
}

fn write_result(rows_affected: u64) -> WriteResult {
    if rows_affected > 0 {
        WriteResult::Applied
    } else {
        WriteResult::Ignored
    }
}

#[async_trait::async_trait]
impl IAlarmEventRepo for PostgresAlarmEventRepo {
    async fn find(
        &self,
        event_uid: &EventUid,
        recipient: &MailAddress,
    ) -> anyhow::Result<Option<AlarmEvent>> {
        let raw: Option<AlarmEventRaw> = sqlx::query_as(
            r#"
            SELECT * FROM alarm_events
            WHERE event_uid = $1 AND recipient = $2
            "#,
        )
        .bind(event_uid.as_str())
        .bind(recipient.as_str())
        .fetch_optional(&self.pool)
        .await?;

        raw.map(AlarmEvent::try_from).transpose()
    }

    async fn find_by_event(&self, event_uid: &EventUid) -> anyhow::Result<Vec<AlarmEvent>> {
        let raws: Vec<AlarmEventRaw> = sqlx::query_as(
            r#"
            SELECT * FROM alarm_events
            WHERE event_uid = $1
            "#,
        )
        .bind(event_uid.as_str())
        .fetch_all(&self.pool)
        .await?;

        raws.into_iter().map(AlarmEvent::try_from).collect()
    }

    async fn create(&self, alarm: &AlarmEvent) -> anyhow::Result<WriteResult> {
        let res = sqlx::query(
            r#"
            INSERT INTO alarm_events
            (event_uid, recipient, alarm_time, event_start_time, recurring, recurrence_id, action, sequence, event_path, raw_event_data)
            VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (event_uid, recipient) DO UPDATE SET
                alarm_time = EXCLUDED.alarm_time,
                event_start_time = EXCLUDED.event_start_time,
                recurring = EXCLUDED.recurring,
                recurrence_id = EXCLUDED.recurrence_id,
                action = EXCLUDED.action,
                sequence = EXCLUDED.sequence,
                event_path = EXCLUDED.event_path,
                raw_event_data = EXCLUDED.raw_event_data
            WHERE alarm_events.sequence <= EXCLUDED.sequence
            "#,
        )
        .bind(alarm.event_uid.as_str())
        .bind(alarm.recipient.as_str())
        .bind(alarm.alarm_time)
        .bind(alarm.event_start_time)
        .bind(alarm.recurring)
        .bind(alarm.recurrence_id.as_deref())
        .bind(alarm.action.as_str())
        .bind(alarm.sequence)
        .bind(&alarm.event_path)
        .bind(&alarm.raw_event_data)
        .execute(&self.pool)
        .await?;

        Ok(write_result(res.rows_affected()))
    }

    async fn update(&self, alarm: &AlarmEvent) -> anyhow::Result<WriteResult> {
        let res = sqlx::query(
            r#"
            UPDATE alarm_events SET
                alarm_time = $3,
                event_start_time = $4,
                recurring = $5,
                recurrence_id = $6,
                action = $7,
                sequence = $8,
                event_path = $9,
                raw_event_data = $10
            WHERE event_uid = $1 AND recipient = $2 AND sequence <= $8
            "#,
        )
        .bind(alarm.event_uid.as_str())
        .bind(alarm.recipient.as_str())
        .bind(alarm.alarm_time)
        .bind(alarm.event_start_time)
        .bind(alarm.recurring)
        .bind(alarm.recurrence_id.as_deref())
        .bind(alarm.action.as_str())
        .bind(alarm.sequence)
        .bind(&alarm.event_path)
        .bind(&alarm.raw_event_data)
        .execute(&self.pool)
        .await?;

        Ok(write_result(res.rows_affected()))
    }

    async fn delete(&self, event_uid: &EventUid, recipient: &MailAddress) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            DELETE FROM alarm_events
            WHERE event_uid = $1 AND recipient = $2
            "#,
        )
        .bind(event_uid.as_str())
        .bind(recipient.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_alarms_to_trigger(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<AlarmEvent>> {
        let raws: Vec<AlarmEventRaw> = sqlx::query_as(
            r#"
            SELECT * FROM alarm_events
            WHERE alarm_time <= $1
            ORDER BY alarm_time
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        raws.into_iter().map(AlarmEvent::try_from).collect()
    }
}
