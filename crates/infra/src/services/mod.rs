mod calendar_store;
mod notifier;

pub use calendar_store::{DavCalendarStore, ICalendarStore, InMemoryCalendarStore};
pub use notifier::{
    IAlarmNotifier, InMemoryAlarmNotifier, LoggingAlarmNotifier, WebhookAlarmNotifier,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Services {
    pub calendar_store: Arc<dyn ICalendarStore>,
    pub notifier: Arc<dyn IAlarmNotifier>,
}
