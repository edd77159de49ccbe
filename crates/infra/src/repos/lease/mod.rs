mod inmemory;
mod postgres;

use calendar_alarms_domain::{Lease, LeaseError, LeaseKey};
pub use inmemory::InMemoryLeaseRepo;
pub use postgres::PostgresLeaseRepo;
use std::time::Duration;

/// Shared storage of the alarm leases. Expiry is enforced by the storage: an
/// expired lease is taken over by the next `acquire` on its key and removed
/// by `purge_expired`.
#[async_trait::async_trait]
pub trait ILeaseRepo: Send + Sync {
    /// Fails with `LeaseError::AlreadyHeld` while a non-expired lease exists for `key`
    async fn acquire(&self, key: &LeaseKey, ttl: Duration) -> Result<Lease, LeaseError>;
    /// Releasing a key that is not held is not an error
    async fn release(&self, key: &LeaseKey) -> anyhow::Result<()>;
    /// Deletes every expired lease, returning how many were removed
    async fn purge_expired(&self) -> anyhow::Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::tests::create_repos;
    use calendar_alarms_utils::create_random_secret;

    fn random_key() -> LeaseKey {
        LeaseKey::new(format!("{}|bob@example.com", create_random_secret(16)))
    }

    #[tokio::test]
    async fn acquire_and_release() {
        for repos in create_repos().await {
            let key = random_key();
            let lease = repos
                .leases
                .acquire(&key, Duration::from_secs(60))
                .await
                .expect("To acquire lease");
            assert_eq!(lease.key, key);

            assert!(matches!(
                repos.leases.acquire(&key, Duration::from_secs(60)).await,
                Err(LeaseError::AlreadyHeld(_))
            ));

            repos.leases.release(&key).await.unwrap();
            assert!(repos
                .leases
                .acquire(&key, Duration::from_secs(60))
                .await
                .is_ok());
            repos.leases.release(&key).await.unwrap();
        }
    }

    #[tokio::test]
    async fn release_of_missing_key_is_a_noop() {
        for repos in create_repos().await {
            assert!(repos.leases.release(&random_key()).await.is_ok());
        }
    }

    #[tokio::test]
    async fn concurrent_acquire_has_one_winner() {
        for repos in create_repos().await {
            let key = random_key();
            let attempts = (0..8).map(|_| {
                let repos = repos.clone();
                let key = key.clone();
                tokio::spawn(async move { repos.leases.acquire(&key, Duration::from_secs(60)).await })
            });
            let results = futures::future::join_all(attempts).await;
            let winners = results
                .into_iter()
                .map(|r| r.expect("Task to complete"))
                .filter(|r| r.is_ok())
                .count();
            assert_eq!(winners, 1);
            repos.leases.release(&key).await.unwrap();
        }
    }

    #[tokio::test]
    async fn expired_lease_can_be_reclaimed() {
        for repos in create_repos().await {
            let key = random_key();
            repos
                .leases
                .acquire(&key, Duration::from_millis(1))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(repos
                .leases
                .acquire(&key, Duration::from_secs(60))
                .await
                .is_ok());
            repos.leases.release(&key).await.unwrap();
        }
    }

    #[tokio::test]
    async fn purges_expired_leases() {
        for repos in create_repos().await {
            let expired = random_key();
            let held = random_key();
            repos
                .leases
                .acquire(&expired, Duration::from_millis(1))
                .await
                .unwrap();
            repos
                .leases
                .acquire(&held, Duration::from_secs(60))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;

            assert!(repos.leases.purge_expired().await.unwrap() >= 1);
            // Only the expired lease is gone
            assert!(matches!(
                repos.leases.acquire(&held, Duration::from_secs(60)).await,
                Err(LeaseError::AlreadyHeld(_))
            ));
            repos.leases.release(&held).await.unwrap();
        }
    }
}
