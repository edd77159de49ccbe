use calendar_alarms_api::Application;
use calendar_alarms_domain::User;
use calendar_alarms_infra::{
    AlarmContext, InMemoryAlarmNotifier, InMemoryBroker, InMemoryCalendarStore, ManualSys,
    SchedulerMode,
};
use chrono::{DateTime, TimeZone, Utc};
use std::{sync::Arc, time::Duration};

pub struct TestApp {
    pub address: String,
    pub ctx: AlarmContext,
    pub broker: Arc<InMemoryBroker>,
    pub store: Arc<InMemoryCalendarStore>,
    pub notifier: Arc<InMemoryAlarmNotifier>,
    pub sys: Arc<ManualSys>,
    pub owner: User,
}

/// The clock of every spawned app starts here
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()
}

// Launch the application as a background task
pub async fn spawn_app() -> TestApp {
    let sys = Arc::new(ManualSys::new(start_time()));
    let broker = Arc::new(InMemoryBroker::new());
    let store = Arc::new(InMemoryCalendarStore::new());
    let notifier = Arc::new(InMemoryAlarmNotifier::new());

    let mut ctx = AlarmContext::create_inmemory_with_sys(sys.clone());
    ctx.broker = broker.clone();
    ctx.services.calendar_store = store.clone();
    ctx.services.notifier = notifier.clone();
    ctx.config.port = 0; // Random port
    ctx.config.recipient_filter = Default::default();
    ctx.config.scheduler.mode = SchedulerMode::Enabled;
    ctx.config.scheduler.poll_interval = Duration::from_millis(50);
    ctx.config.scheduler.jitter_max = Duration::from_millis(0);

    let owner = User::new("home1", "alice@example.com".parse().unwrap());
    ctx.repos
        .users
        .insert(&owner)
        .await
        .expect("To insert the calendar owner");

    let application = Application::new(ctx.clone())
        .await
        .expect("Failed to build application.");

    let address = format!("http://localhost:{}", application.port());
    let _ = actix_web::rt::spawn(async move {
        application
            .start()
            .await
            .expect("Expected application to start");
    });

    TestApp {
        address,
        ctx,
        broker,
        store,
        notifier,
        sys,
        owner,
    }
}
