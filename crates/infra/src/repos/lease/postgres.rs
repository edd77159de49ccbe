use super::ILeaseRepo;
use calendar_alarms_domain::{Lease, LeaseError, LeaseKey};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::time::Duration;

pub struct PostgresLeaseRepo {
    pool: PgPool,
}

impl PostgresLeaseRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct LeaseRaw {
    lease_key: String,
    expires_at: DateTime<Utc>,
}

#[async_trait::async_trait]
impl ILeaseRepo for PostgresLeaseRepo {
    async fn acquire(&self, key: &LeaseKey, ttl: Duration) -> Result<Lease, LeaseError> {
        // The expiry is assigned by the database clock so that all workers agree on it
        let raw: Option<LeaseRaw> = sqlx::query_as(
            r#"
            INSERT INTO alarm_event_leases (lease_key, expires_at)
            VALUES($1, now() + make_interval(secs => $2))
            ON CONFLICT (lease_key) DO UPDATE SET
                expires_at = EXCLUDED.expires_at
            WHERE alarm_event_leases.expires_at <= now()
            RETURNING lease_key, expires_at
            "#,
        )
        .bind(key.as_str())
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        match raw {
            Some(raw) => Ok(Lease {
                key: LeaseKey::new(raw.lease_key),
                expires_at: raw.expires_at,
            }),
            None => Err(LeaseError::AlreadyHeld(key.clone())),
        }
    }

    async fn release(&self, key: &LeaseKey) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            DELETE FROM alarm_event_leases
            WHERE lease_key = $1
            "#,
        )
        .bind(key.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            DELETE FROM alarm_event_leases
            WHERE expires_at <= now()
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }
}
