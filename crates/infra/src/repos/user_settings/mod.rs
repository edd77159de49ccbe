mod inmemory;
mod postgres;

pub use inmemory::InMemoryUserSettingsRepo;
pub use postgres::PostgresUserSettingsRepo;

/// Per user preferences relevant to alarms
#[async_trait::async_trait]
pub trait IUserSettingsRepo: Send + Sync {
    /// `None` when the user never set the preference
    async fn find_alarms_enabled(&self, user_id: &str) -> anyhow::Result<Option<bool>>;
    async fn save_alarms_enabled(&self, user_id: &str, enabled: bool) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use crate::repos::tests::create_repos;
    use calendar_alarms_utils::create_random_secret;

    #[tokio::test]
    async fn save_and_find() {
        for repos in create_repos().await {
            let user_id = create_random_secret(16);
            assert_eq!(
                repos.user_settings.find_alarms_enabled(&user_id).await.unwrap(),
                None
            );

            repos
                .user_settings
                .save_alarms_enabled(&user_id, false)
                .await
                .unwrap();
            assert_eq!(
                repos.user_settings.find_alarms_enabled(&user_id).await.unwrap(),
                Some(false)
            );

            repos
                .user_settings
                .save_alarms_enabled(&user_id, true)
                .await
                .unwrap();
            assert_eq!(
                repos.user_settings.find_alarms_enabled(&user_id).await.unwrap(),
                Some(true)
            );
        }
    }
}
