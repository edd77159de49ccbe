use crate::shared::mail_address::MailAddress;

/// Owner of a calendar home
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Same as the id of the user's calendar home
    pub id: String,
    pub email: MailAddress,
}

impl User {
    pub fn new(id: impl Into<String>, email: MailAddress) -> Self {
        Self {
            id: id.into(),
            email,
        }
    }
}
