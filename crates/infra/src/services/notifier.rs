use calendar_alarms_api_structs::dtos::AlarmReminderDTO;
use calendar_alarms_domain::AlarmEvent;
use reqwest::Client;
use tracing::{error, info};

/// Delivers a fired alarm to its recipient
#[async_trait::async_trait]
pub trait IAlarmNotifier: Send + Sync {
    async fn notify(&self, alarm: &AlarmEvent) -> anyhow::Result<()>;
}

/// POSTs the reminder to a webhook that renders and sends it
pub struct WebhookAlarmNotifier {
    client: Client,
    url: String,
    key: Option<String>,
}

impl WebhookAlarmNotifier {
    pub fn new(url: String, key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url,
            key,
        }
    }
}

#[async_trait::async_trait]
impl IAlarmNotifier for WebhookAlarmNotifier {
    async fn notify(&self, alarm: &AlarmEvent) -> anyhow::Result<()> {
        let mut req = self
            .client
            .post(&self.url)
            .json(&AlarmReminderDTO::new(alarm));
        if let Some(key) = &self.key {
            req = req.header("calendar-alarms-webhook-key", key);
        }
        match req.send().await {
            Ok(res) => {
                res.error_for_status()?;
                Ok(())
            }
            Err(e) => {
                error!(
                    "[Network Error] Reminder webhook POST error. Error message: {:?}",
                    e
                );
                Err(anyhow::Error::new(e))
            }
        }
    }
}

/// Only logs the reminders, used when no webhook is configured
pub struct LoggingAlarmNotifier {}

#[async_trait::async_trait]
impl IAlarmNotifier for LoggingAlarmNotifier {
    async fn notify(&self, alarm: &AlarmEvent) -> anyhow::Result<()> {
        info!(
            event_uid = %alarm.event_uid,
            recipient = %alarm.recipient,
            action = alarm.action.as_str(),
            "Alarm due at {} for the occurrence starting at {}",
            alarm.alarm_time,
            alarm.event_start_time
        );
        Ok(())
    }
}

/// Records the reminders it is given
pub struct InMemoryAlarmNotifier {
    sent: std::sync::Mutex<Vec<AlarmEvent>>,
}

impl InMemoryAlarmNotifier {
    pub fn new() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<AlarmEvent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IAlarmNotifier for InMemoryAlarmNotifier {
    async fn notify(&self, alarm: &AlarmEvent) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(alarm.clone());
        Ok(())
    }
}
