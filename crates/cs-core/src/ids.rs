//! Typed ID wrappers providing compile-time safety for identifiers.
//!
//! Locally generated identifiers are newtypes over `Uuid`. Titles are
//! addressed by the upstream server's own rating keys, so [`TitleId`] wraps a
//! validated string instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Generate a newtype ID wrapper over `Uuid`.
///
/// The macro produces a struct with:
/// - `new()` to create a random v4 UUID
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `Serialize`, `Deserialize`
/// - `Display` and `FromStr` delegating to the inner UUID
/// - `From<Uuid>` and `Into<Uuid>` conversions
macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                /// Create a new random ID.
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }

                /// Return the inner UUID value.
                #[must_use]
                pub fn as_uuid(&self) -> &Uuid {
                    &self.0
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    Uuid::parse_str(s).map(Self)
                }
            }

            impl From<Uuid> for $name {
                fn from(uuid: Uuid) -> Self {
                    Self(uuid)
                }
            }

            impl From<$name> for Uuid {
                fn from(id: $name) -> Self {
                    id.0
                }
            }
        )+
    };
}

typed_id! {
    /// Identifies one watch attempt. Doubles as the upstream re-encode
    /// session identifier so a later stop call can address the job.
    SessionId,
}

/// Upstream rating key of a playable title.
///
/// Rating keys are short ASCII alphanumeric strings; anything else is
/// rejected so an id can be interpolated into upstream paths safely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TitleId(String);

impl TitleId {
    /// Borrow the raw rating key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TitleId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.len() > 64 {
            return Err(Error::Validation(format!("invalid title id: {s:?}")));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(Error::Validation(format!("invalid title id: {s:?}")));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for TitleId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TitleId> for String {
    fn from(id: TitleId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_round_trips_through_display() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn title_id_accepts_rating_keys() {
        let id: TitleId = "48213".parse().unwrap();
        assert_eq!(id.as_str(), "48213");
        assert_eq!(id.to_string(), "48213");
    }

    #[test]
    fn title_id_trims_whitespace() {
        let id: TitleId = " 77 ".parse().unwrap();
        assert_eq!(id.as_str(), "77");
    }

    #[test]
    fn title_id_rejects_path_characters() {
        assert!("".parse::<TitleId>().is_err());
        assert!("../etc".parse::<TitleId>().is_err());
        assert!("12/34".parse::<TitleId>().is_err());
        assert!("12?x=1".parse::<TitleId>().is_err());
    }

    #[test]
    fn title_id_deserializes_with_validation() {
        let id: TitleId = serde_json::from_str("\"901\"").unwrap();
        assert_eq!(id.as_str(), "901");
        assert!(serde_json::from_str::<TitleId>("\"a b\"").is_err());
    }
}
