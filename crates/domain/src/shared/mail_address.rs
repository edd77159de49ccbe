use serde::{de::Visitor, Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

/// A normalized (trimmed, lowercased) mail address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MailAddress(String);

impl MailAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the value of a `cal-address` property, e.g. `mailto:bob@example.com`
    pub fn from_cal_address(value: &str) -> Result<Self, InvalidMailAddressError> {
        let value = value.trim();
        let address = match value.get(..7) {
            Some(prefix) if prefix.eq_ignore_ascii_case("mailto:") => &value[7..],
            _ => value,
        };
        address.parse()
    }
}

impl Display for MailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum InvalidMailAddressError {
    #[error("Mail address: {0} is malformed")]
    Malformed(String),
}

impl FromStr for MailAddress {
    type Err = InvalidMailAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = s.split('@');
        let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => (local, domain),
            _ => return Err(InvalidMailAddressError::Malformed(s.to_string())),
        };
        if local.is_empty()
            || domain.is_empty()
            || domain.starts_with('.')
            || domain.ends_with('.')
            || s.chars().any(char::is_whitespace)
        {
            return Err(InvalidMailAddressError::Malformed(s.to_string()));
        }

        Ok(Self(s.to_lowercase()))
    }
}

impl Serialize for MailAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MailAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct MailAddressVisitor;

        impl<'de> Visitor<'de> for MailAddressVisitor {
            type Value = MailAddress;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("A valid mail address")
            }

            fn visit_str<E>(self, value: &str) -> Result<MailAddress, E>
            where
                E: serde::de::Error,
            {
                value
                    .parse::<MailAddress>()
                    .map_err(|_| E::custom(format!("Malformed mail address: {}", value)))
            }
        }

        deserializer.deserialize_str(MailAddressVisitor)
    }
}
