use super::IUserRepo;
use calendar_alarms_domain::{MailAddress, User};
use sqlx::{FromRow, PgPool};
use std::convert::TryFrom;

pub struct PostgresUserRepo {
    pool: PgPool,
}

impl PostgresUserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct UserRaw {
    user_id: String,
    email: String,
}

impl TryFrom<UserRaw> for User {
    type Error = anyhow::Error;

    fn try_from(raw: UserRaw) -> Result<Self, Self::Error> {
        Ok(User::new(raw.user_id, raw.email.parse()?))
    }
}

#[async_trait::async_trait]
impl IUserRepo for PostgresUserRepo {
    async fn insert(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users(user_id, email)
            VALUES($1, $2)
            "#,
        )
        .bind(&user.id)
        .bind(user.email.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        let raw: Option<UserRaw> = sqlx::query_as(
            r#"
            SELECT * FROM users AS u
            WHERE u.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        raw.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &MailAddress) -> anyhow::Result<Option<User>> {
        let raw: Option<UserRaw> = sqlx::query_as(
            r#"
            SELECT * FROM users AS u
            WHERE u.email = $1
            LIMIT 1
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        raw.map(User::try_from).transpose()
    }
}
