//! Validated name newtypes for world entities
//!
//! Names are the identity of Accounts, Characters and Items, so they are valid
//! by construction:
//! - Non-empty
//! - Within length limits
//! - Trimmed of leading/trailing whitespace

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Maximum length for name fields
const MAX_NAME_LENGTH: usize = 200;

macro_rules! define_name {
    ($name:ident, $label:literal) => {
        #[doc = concat!("A validated ", $label, " (non-empty, <=200 chars, trimmed)")]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Create a new validated ", $label, ".")]
            ///
            /// # Errors
            ///
            /// Returns `DomainError::Validation` if the name is empty after
            /// trimming or exceeds 200 characters.
            pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
                let name = name.into();
                let trimmed = name.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::validation(concat!(
                        $label,
                        " cannot be empty"
                    )));
                }
                if trimmed.chars().count() > MAX_NAME_LENGTH {
                    return Err(DomainError::validation(format!(
                        "{} cannot exceed {} characters",
                        $label, MAX_NAME_LENGTH
                    )));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Returns the name as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl std::str::FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> String {
                name.0
            }
        }
    };
}

define_name!(CharacterName, "Character name");
define_name!(ItemName, "Item name");
define_name!(AccountName, "Account name");

#[cfg(test)]
mod tests {
    use super::*;

    mod character_name {
        use super::*;

        #[test]
        fn valid_name() {
            let name = CharacterName::new("Alvin").unwrap();
            assert_eq!(name.as_str(), "Alvin");
            assert_eq!(name.to_string(), "Alvin");
        }

        #[test]
        fn empty_name_rejected() {
            let err = CharacterName::new("").unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
            assert!(err.to_string().contains("cannot be empty"));
        }

        #[test]
        fn whitespace_only_rejected() {
            let err = CharacterName::new("   ").unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }

        #[test]
        fn name_is_trimmed() {
            let name = CharacterName::new("  Old Tom  ").unwrap();
            assert_eq!(name.as_str(), "Old Tom");
        }

        #[test]
        fn too_long_rejected() {
            let err = CharacterName::new("a".repeat(201)).unwrap_err();
            assert!(err.to_string().contains("200"));
        }

        #[test]
        fn max_length_accepted() {
            let name = CharacterName::new("a".repeat(200)).unwrap();
            assert_eq!(name.as_str().len(), 200);
        }
    }

    mod serde_validation {
        use super::*;

        #[test]
        fn deserialize_runs_validation() {
            let ok: ItemName = serde_json::from_str("\"  lantern \"").unwrap();
            assert_eq!(ok.as_str(), "lantern");

            let bad: Result<AccountName, _> = serde_json::from_str("\"\"");
            assert!(bad.is_err());
        }

        #[test]
        fn serializes_as_plain_string() {
            let name = AccountName::new("operator").unwrap();
            assert_eq!(serde_json::to_string(&name).unwrap(), "\"operator\"");
        }
    }
}
