mod inmemory;
mod postgres;

use calendar_alarms_domain::{MailAddress, User};
pub use inmemory::InMemoryUserRepo;
pub use postgres::PostgresUserRepo;

/// Directory of calendar owners
#[async_trait::async_trait]
pub trait IUserRepo: Send + Sync {
    async fn insert(&self, user: &User) -> anyhow::Result<()>;
    /// Looks up the owner of a calendar home
    async fn find(&self, user_id: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &MailAddress) -> anyhow::Result<Option<User>>;
}
