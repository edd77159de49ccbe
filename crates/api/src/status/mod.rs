use crate::{consumer::ConsumerSupervisor, health::run_health_checks};
use actix_web::{web, HttpResponse};
use calendar_alarms_api_structs::get_healthcheck::HealthStatus;
use calendar_alarms_api_structs::get_service_health::*;
use calendar_alarms_infra::AlarmContext;

async fn status() -> HttpResponse {
    HttpResponse::Ok().json(APIResponse {
        message: "Yo! We are up!\r\n".into(),
    })
}

async fn healthcheck(
    ctx: web::Data<AlarmContext>,
    supervisor: web::Data<ConsumerSupervisor>,
) -> HttpResponse {
    let res = run_health_checks(&ctx, &supervisor).await;
    match res.status {
        HealthStatus::Unhealthy => HttpResponse::ServiceUnavailable().json(res),
        _ => HttpResponse::Ok().json(res),
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(status));
    cfg.route("/healthcheck", web::get().to(healthcheck));
}
