use crate::shared::mail_address::MailAddress;
use std::collections::HashSet;
use tracing::warn;

/// Decides which recipients may get alarms scheduled
#[derive(Debug, Clone, PartialEq)]
pub enum RecipientFilter {
    AcceptAll,
    /// Only addresses in the set, used to keep staging environments from
    /// mailing real users
    AllowList(HashSet<MailAddress>),
}

impl Default for RecipientFilter {
    fn default() -> Self {
        Self::AcceptAll
    }
}

impl RecipientFilter {
    /// Builds a filter from a comma separated list of addresses. An absent or
    /// blank list accepts everyone.
    pub fn from_allow_list(list: Option<&str>) -> Self {
        let list = match list {
            Some(list) if !list.trim().is_empty() => list,
            _ => return Self::AcceptAll,
        };
        let addresses = list
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .filter_map(|a| match a.parse::<MailAddress>() {
                Ok(address) => Some(address),
                Err(e) => {
                    warn!("Ignoring allow list entry: {}", e);
                    None
                }
            })
            .collect();
        Self::AllowList(addresses)
    }

    pub fn should_process(&self, recipient: &MailAddress) -> bool {
        match self {
            Self::AcceptAll => true,
            Self::AllowList(addresses) => addresses.contains(recipient),
        }
    }
}
