use super::IUserSettingsRepo;
use std::collections::HashMap;

pub struct InMemoryUserSettingsRepo {
    alarms_enabled: std::sync::Mutex<HashMap<String, bool>>,
}

impl InMemoryUserSettingsRepo {
    pub fn new() -> Self {
        Self {
            alarms_enabled: std::sync::Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl IUserSettingsRepo for InMemoryUserSettingsRepo {
    async fn find_alarms_enabled(&self, user_id: &str) -> anyhow::Result<Option<bool>> {
        Ok(self.alarms_enabled.lock().unwrap().get(user_id).copied())
    }

    async fn save_alarms_enabled(&self, user_id: &str, enabled: bool) -> anyhow::Result<()> {
        self.alarms_enabled
            .lock()
            .unwrap()
            .insert(user_id.to_string(), enabled);
        Ok(())
    }
}
