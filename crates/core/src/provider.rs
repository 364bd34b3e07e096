//! Provider slug value object.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Slug identifying an external integration provider (e.g. `"sefaz"`,
/// `"bank-feed"`).
///
/// Compared by value; validated at construction so every held instance is
/// well-formed: lowercase ASCII alphanumerics and hyphens, 1..=64 chars,
/// no leading/trailing/double hyphen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderSlug(String);

impl ProviderSlug {
    pub fn parse(s: impl AsRef<str>) -> Result<Self, DomainError> {
        let s = s.as_ref();
        if s.is_empty() || s.len() > 64 {
            return Err(DomainError::validation(
                "provider slug must be 1..=64 characters",
            ));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(DomainError::validation(
                "provider slug may only contain lowercase letters, digits, and '-'",
            ));
        }
        if s.starts_with('-') || s.ends_with('-') || s.contains("--") {
            return Err(DomainError::validation(
                "provider slug has malformed hyphenation",
            ));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ProviderSlug {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProviderSlug {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProviderSlug {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProviderSlug> for String {
    fn from(value: ProviderSlug) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_slugs() {
        for s in ["sefaz", "bank-feed", "provider2", "a"] {
            assert!(ProviderSlug::parse(s).is_ok(), "{s} should parse");
        }
    }

    #[test]
    fn rejects_malformed_slugs() {
        for s in ["", "UPPER", "with space", "-lead", "trail-", "dou--ble", "ünïcode"] {
            assert!(ProviderSlug::parse(s).is_err(), "{s} should be rejected");
        }
    }

    #[test]
    fn rejects_overlong_slug() {
        let s = "a".repeat(65);
        assert!(ProviderSlug::parse(&s).is_err());
    }

    #[test]
    fn serde_round_trip_validates() {
        let slug: ProviderSlug = serde_json::from_str("\"bank-feed\"").unwrap();
        assert_eq!(slug.as_str(), "bank-feed");
        assert!(serde_json::from_str::<ProviderSlug>("\"Bad Slug\"").is_err());
    }
}
