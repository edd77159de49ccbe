use super::ILeaseRepo;
use crate::system::ISys;
use calendar_alarms_domain::{Lease, LeaseError, LeaseKey};
use std::{collections::HashMap, sync::Arc, time::Duration};

pub struct InMemoryLeaseRepo {
    leases: std::sync::Mutex<HashMap<LeaseKey, Lease>>,
    sys: Arc<dyn ISys>,
}

impl InMemoryLeaseRepo {
    pub fn new(sys: Arc<dyn ISys>) -> Self {
        Self {
            leases: std::sync::Mutex::new(HashMap::new()),
            sys,
        }
    }
}

#[async_trait::async_trait]
impl ILeaseRepo for InMemoryLeaseRepo {
    async fn acquire(&self, key: &LeaseKey, ttl: Duration) -> Result<Lease, LeaseError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(anyhow::Error::from)?;
        let now = self.sys.now();
        let mut leases = self.leases.lock().unwrap();
        leases.retain(|_, lease| !lease.is_expired(&now));
        if leases.contains_key(key) {
            return Err(LeaseError::AlreadyHeld(key.clone()));
        }
        let lease = Lease {
            key: key.clone(),
            expires_at: now + ttl,
        };
        leases.insert(key.clone(), lease.clone());
        Ok(lease)
    }

    async fn release(&self, key: &LeaseKey) -> anyhow::Result<()> {
        self.leases.lock().unwrap().remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> anyhow::Result<u64> {
        let now = self.sys.now();
        let mut leases = self.leases.lock().unwrap();
        let before = leases.len();
        leases.retain(|_, lease| !lease.is_expired(&now));
        Ok((before - leases.len()) as u64)
    }
}
