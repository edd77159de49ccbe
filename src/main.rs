mod telemetry;

use calendar_alarms_api::Application;
use calendar_alarms_infra::{run_migration, setup_context};
use telemetry::{get_subscriber, init_subscriber};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    openssl_probe::init_ssl_cert_env_vars();

    let subscriber = get_subscriber("calendar_alarms".into(), "info".into());
    init_subscriber(subscriber);

    run_migration()
        .await
        .expect("Failed to run the database migrations");
    let context = setup_context().await;

    let app = Application::new(context).await?;
    app.start().await
}
