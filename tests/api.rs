mod helpers;

use calendar_alarms_api_structs::get_healthcheck::{APIResponse, HealthStatus};
use calendar_alarms_domain::{jcal::parse_jcal, AlarmQueue, EventUid, MailAddress};
use calendar_alarms_infra::IMessageBroker;
use chrono::{TimeZone, Utc};
use helpers::{
    setup::{spawn_app, TestApp},
    utils::{eventually, meeting, notification},
};

const MEETING_PATH: &str = "/calendars/home1/work/meeting.ics";

async fn get_health(app: &TestApp) -> (u16, APIResponse) {
    let res = reqwest::get(format!("{}/api/v1/healthcheck", app.address))
        .await
        .expect("Expected healthcheck to respond");
    let status = res.status().as_u16();
    let body = res.json::<APIResponse>().await.expect("Health report");
    (status, body)
}

async fn stored_alarm_time(app: &TestApp) -> Option<chrono::DateTime<Utc>> {
    let recipient: MailAddress = "alice@example.com".parse().unwrap();
    app.ctx
        .repos
        .alarm_events
        .find(&EventUid::new("meeting"), &recipient)
        .await
        .unwrap()
        .map(|alarm| alarm.alarm_time)
}

async fn publish(app: &TestApp, queue: AlarmQueue, body: &[u8]) {
    app.broker
        .publish(&queue.exchange(), body)
        .await
        .expect("To publish notification");
}

#[actix_web::test]
async fn test_status_ok() {
    let app = spawn_app().await;
    let res = reqwest::get(format!("{}/api/v1/", app.address))
        .await
        .expect("Expected status to respond");
    assert!(res.status().is_success());
}

#[actix_web::test]
async fn test_healthcheck_is_healthy_once_consuming() {
    let app = spawn_app().await;
    let app_ref = &app;
    assert!(
        eventually(|| async move {
            let (status, body) = get_health(app_ref).await;
            status == 200 && body.status == HealthStatus::Healthy
        })
        .await
    );
}

#[actix_web::test]
async fn test_notifications_keep_one_alarm_per_recipient() {
    let app = spawn_app().await;
    let app_ref = &app;
    app.store
        .put(&MEETING_PATH.parse().unwrap(), parse_jcal(&meeting()).unwrap());

    publish(&app, AlarmQueue::Created, &notification(MEETING_PATH, meeting())).await;
    let expected = Utc.with_ymd_and_hms(2025, 3, 10, 8, 45, 0).unwrap();
    assert!(eventually(|| async move { stored_alarm_time(app_ref).await == Some(expected) }).await);

    publish(&app, AlarmQueue::Updated, &notification(MEETING_PATH, meeting())).await;
    publish(&app, AlarmQueue::Request, &notification(MEETING_PATH, meeting())).await;
    let queues_drained = || async move {
        let mut drained = true;
        for queue in [AlarmQueue::Updated, AlarmQueue::Request].iter() {
            drained &= app_ref.broker.message_count(&queue.queue()).await.unwrap() == 0;
        }
        drained
    };
    assert!(eventually(queues_drained).await);
    assert_eq!(stored_alarm_time(&app).await, Some(expected));

    publish(&app, AlarmQueue::Deleted, &notification(MEETING_PATH, meeting())).await;
    assert!(eventually(|| async move { stored_alarm_time(app_ref).await.is_none() }).await);
}

#[actix_web::test]
async fn test_malformed_notification_is_dead_lettered() {
    let app = spawn_app().await;
    let app_ref = &app;

    publish(&app, AlarmQueue::Created, b"definitely not json").await;
    publish(
        &app,
        AlarmQueue::Created,
        &notification("/somewhere/else.ics", meeting()),
    )
    .await;

    let dead_letter_queue = &AlarmQueue::Created.dead_letter_queue();
    assert!(
        eventually(|| async move {
            app_ref
                .broker
                .message_count(dead_letter_queue)
                .await
                .unwrap()
                == 2
        })
        .await
    );
    assert_eq!(stored_alarm_time(&app).await, None);

    // Degraded is not an outage
    let (status, body) = get_health(&app).await;
    assert_eq!(status, 200);
    assert_eq!(body.status, HealthStatus::Degraded);
}

#[actix_web::test]
async fn test_due_alarm_is_fired_once() {
    let app = spawn_app().await;
    let app_ref = &app;
    app.store
        .put(&MEETING_PATH.parse().unwrap(), parse_jcal(&meeting()).unwrap());
    publish(&app, AlarmQueue::Created, &notification(MEETING_PATH, meeting())).await;
    assert!(eventually(|| async move { stored_alarm_time(app_ref).await.is_some() }).await);

    app.sys
        .set(Utc.with_ymd_and_hms(2025, 3, 10, 8, 46, 0).unwrap());
    assert!(eventually(|| async move { app_ref.notifier.sent().len() == 1 }).await);
    assert!(eventually(|| async move { stored_alarm_time(app_ref).await.is_none() }).await);

    // Later polls find nothing to fire
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, app.owner.email);
}
