use calendar_alarms_domain::{jcal::parse_jcal, EventDocument, EventPath, User};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use tracing::error;

/// Read access to the calendar store holding the live event data
#[async_trait::async_trait]
pub trait ICalendarStore: Send + Sync {
    async fn fetch_event(&self, owner: &User, path: &EventPath) -> anyhow::Result<EventDocument>;
}

/// Fetches events as jCal over HTTP
pub struct DavCalendarStore {
    client: Client,
    base_url: String,
}

impl DavCalendarStore {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }
}

#[async_trait::async_trait]
impl ICalendarStore for DavCalendarStore {
    async fn fetch_event(&self, owner: &User, path: &EventPath) -> anyhow::Result<EventDocument> {
        let res = match self
            .client
            .get(&format!("{}{}", self.base_url, path))
            .header("accept", "application/calendar+json")
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => {
                error!(
                    "[Network Error] Calendar store GET error for user: {}. Error message: {:?}",
                    owner.id, e
                );
                return Err(anyhow::Error::new(e));
            }
        };
        let jcal = res.error_for_status()?.json::<Value>().await.map_err(|e| {
            error!(
                "[Unexpected Response] Calendar store GET error. Error message: {:?}",
                e
            );
            anyhow::Error::new(e)
        })?;

        Ok(parse_jcal(&jcal)?)
    }
}

/// Calendar store backed by a map from event path to document
pub struct InMemoryCalendarStore {
    events: std::sync::Mutex<HashMap<String, EventDocument>>,
}

impl InMemoryCalendarStore {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn put(&self, path: &EventPath, document: EventDocument) {
        self.events
            .lock()
            .unwrap()
            .insert(path.to_string(), document);
    }

    pub fn remove(&self, path: &EventPath) {
        self.events.lock().unwrap().remove(&path.to_string());
    }
}

#[async_trait::async_trait]
impl ICalendarStore for InMemoryCalendarStore {
    async fn fetch_event(&self, _owner: &User, path: &EventPath) -> anyhow::Result<EventDocument> {
        self.events
            .lock()
            .unwrap()
            .get(&path.to_string())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Event not found: {}", path))
    }
}
