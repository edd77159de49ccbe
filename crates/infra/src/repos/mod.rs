mod alarm_event;
mod lease;
mod shared;
mod user;
mod user_settings;

use crate::system::ISys;
pub use alarm_event::{IAlarmEventRepo, WriteResult};
use alarm_event::{InMemoryAlarmEventRepo, PostgresAlarmEventRepo};
pub use lease::ILeaseRepo;
use lease::{InMemoryLeaseRepo, PostgresLeaseRepo};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
pub use user::IUserRepo;
use user::{InMemoryUserRepo, PostgresUserRepo};
pub use user_settings::IUserSettingsRepo;
use user_settings::{InMemoryUserSettingsRepo, PostgresUserSettingsRepo};

#[derive(Clone)]
pub struct Repos {
    pub alarm_events: Arc<dyn IAlarmEventRepo>,
    pub leases: Arc<dyn ILeaseRepo>,
    pub users: Arc<dyn IUserRepo>,
    pub user_settings: Arc<dyn IUserSettingsRepo>,
}

impl Repos {
    pub async fn create_postgres(
        connection_string: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        info!("DB CHECKING CONNECTION ...");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await?;
        info!("DB CHECKING CONNECTION ... [done]");
        Ok(Self {
            alarm_events: Arc::new(PostgresAlarmEventRepo::new(pool.clone())),
            leases: Arc::new(PostgresLeaseRepo::new(pool.clone())),
            users: Arc::new(PostgresUserRepo::new(pool.clone())),
            user_settings: Arc::new(PostgresUserSettingsRepo::new(pool)),
        })
    }

    /// Lease expiry follows `sys` so that tests can move time forward
    pub fn create_inmemory(sys: Arc<dyn ISys>) -> Self {
        Self {
            alarm_events: Arc::new(InMemoryAlarmEventRepo::new()),
            leases: Arc::new(InMemoryLeaseRepo::new(sys)),
            users: Arc::new(InMemoryUserRepo::new()),
            user_settings: Arc::new(InMemoryUserSettingsRepo::new()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::system::RealSys;

    /// The in-memory repos, plus the Postgres ones when DATABASE_URL is set
    pub async fn create_repos() -> Vec<Repos> {
        let mut repos = vec![Repos::create_inmemory(Arc::new(RealSys {}))];
        if let Ok(connection_string) = std::env::var("DATABASE_URL") {
            crate::run_migration()
                .await
                .expect("To run the migrations");
            repos.push(
                Repos::create_postgres(&connection_string)
                    .await
                    .expect("To connect to postgres"),
            );
        }
        repos
    }
}
