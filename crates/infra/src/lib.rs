mod broker;
mod config;
mod repos;
mod services;
mod system;

pub use broker::{
    Acknowledger, Delivery, DeliveryStream, IMessageBroker, InMemoryBroker, QueueTopology,
    RabbitMqBroker,
};
pub use config::{AlarmSchedulerConfig, Config, MissingAccountPolicy, SchedulerMode};
pub use repos::{IAlarmEventRepo, ILeaseRepo, IUserRepo, IUserSettingsRepo, Repos, WriteResult};
pub use services::*;
use sqlx::migrate::MigrateError;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
pub use system::{ISys, ManualSys, RealSys};

#[derive(Clone)]
pub struct AlarmContext {
    pub repos: Repos,
    pub config: Config,
    pub sys: Arc<dyn ISys>,
    pub services: Services,
    pub broker: Arc<dyn IMessageBroker>,
}

struct ContextParams {
    pub postgres_connection_string: String,
}

impl AlarmContext {
    async fn create(params: ContextParams) -> Self {
        let config = Config::new();
        let repos = Repos::create_postgres(&params.postgres_connection_string)
            .await
            .expect("Postgres credentials must be set and valid");
        let broker = RabbitMqBroker::connect(&config.amqp_uri, config.broker_reconnect_interval)
            .await
            .expect("The message broker to be reachable");
        let notifier: Arc<dyn IAlarmNotifier> = match &config.webhook_url {
            Some(url) => Arc::new(WebhookAlarmNotifier::new(
                url.clone(),
                config.webhook_key.clone(),
            )),
            None => Arc::new(LoggingAlarmNotifier {}),
        };
        let services = Services {
            calendar_store: Arc::new(DavCalendarStore::new(config.dav_url.clone())),
            notifier,
        };
        Self {
            repos,
            config,
            sys: Arc::new(RealSys {}),
            services,
            broker: Arc::new(broker),
        }
    }

    /// Context where every collaborator lives in memory
    pub fn create_inmemory() -> Self {
        let sys: Arc<dyn ISys> = Arc::new(RealSys {});
        Self {
            repos: Repos::create_inmemory(sys.clone()),
            config: Config::new(),
            sys,
            services: Services {
                calendar_store: Arc::new(InMemoryCalendarStore::new()),
                notifier: Arc::new(InMemoryAlarmNotifier::new()),
            },
            broker: Arc::new(InMemoryBroker::new()),
        }
    }

    /// Same as `create_inmemory` but the clock is `sys`
    pub fn create_inmemory_with_sys(sys: Arc<dyn ISys>) -> Self {
        Self {
            repos: Repos::create_inmemory(sys.clone()),
            sys,
            ..Self::create_inmemory()
        }
    }
}

/// Will setup the infrastructure context given the environment
pub async fn setup_context() -> AlarmContext {
    AlarmContext::create(ContextParams {
        postgres_connection_string: get_psql_connection_string(),
    })
    .await
}

fn get_psql_connection_string() -> String {
    const PSQL_CONNECTION_STRING: &str = "DATABASE_URL";

    std::env::var(PSQL_CONNECTION_STRING)
        .unwrap_or_else(|_| panic!("{} env var to be present.", PSQL_CONNECTION_STRING))
}

pub async fn run_migration() -> Result<(), MigrateError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&get_psql_connection_string())
        .await
        .expect("TO CONNECT TO POSTGRES");

    sqlx::migrate!().run(&pool).await
}
