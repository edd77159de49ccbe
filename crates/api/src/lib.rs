mod alarm;
mod consumer;
mod health;
mod job_schedulers;
mod shared;
mod status;

use actix_web::{dev::Server, web, App, HttpServer};
pub use alarm::handle_event_alarm::{AlarmOutcome, SkipReason};
pub use alarm::trigger_alarms::TriggerSummary;
use calendar_alarms_infra::AlarmContext;
pub use consumer::{ConsumerCommand, ConsumerSupervisor, EventAlarmConsumer};
use job_schedulers::start_alarm_trigger_job;
use std::net::TcpListener;
use tracing_actix_web::TracingLogger;

pub fn configure_server_api(cfg: &mut web::ServiceConfig) {
    status::configure_routes(cfg);
}

pub struct Application {
    server: Server,
    port: u16,
}

impl Application {
    pub async fn new(context: AlarmContext) -> Result<Self, std::io::Error> {
        let supervisor = ConsumerSupervisor::start(context.clone());
        let (server, port) = Application::configure_server(context.clone(), supervisor).await?;
        Application::start_job_schedulers(context);

        Ok(Self { server, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn start_job_schedulers(context: AlarmContext) {
        start_alarm_trigger_job(context);
    }

    async fn configure_server(
        context: AlarmContext,
        supervisor: ConsumerSupervisor,
    ) -> Result<(Server, u16), std::io::Error> {
        let port = context.config.port;
        let address = format!("0.0.0.0:{}", port);
        let listener = TcpListener::bind(&address)?;
        let port = listener.local_addr()?.port();

        let ctx = web::Data::new(context);
        let supervisor = web::Data::new(supervisor);
        let server = HttpServer::new(move || {
            App::new()
                .wrap(TracingLogger::default())
                .app_data(ctx.clone())
                .app_data(supervisor.clone())
                .service(web::scope("/api/v1").configure(configure_server_api))
        })
        .listen(listener)?
        .workers(2)
        .run();

        Ok((server, port))
    }

    pub async fn start(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}
