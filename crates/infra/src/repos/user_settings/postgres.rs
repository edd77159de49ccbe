use super::IUserSettingsRepo;
use sqlx::PgPool;

pub struct PostgresUserSettingsRepo {
    pool: PgPool,
}

impl PostgresUserSettingsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IUserSettingsRepo for PostgresUserSettingsRepo {
    async fn find_alarms_enabled(&self, user_id: &str) -> anyhow::Result<Option<bool>> {
        let enabled: Option<(bool,)> = sqlx::query_as(
            r#"
            SELECT alarms_enabled FROM user_settings
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(enabled.map(|(enabled,)| enabled))
    }

    async fn save_alarms_enabled(&self, user_id: &str, enabled: bool) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_settings(user_id, alarms_enabled)
            VALUES($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET alarms_enabled = EXCLUDED.alarms_enabled
            "#,
        )
        .bind(user_id)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
