//! Type-safe pool and session identifiers.
//!
//! Both are caller-chosen strings taken from the request path. The
//! newtypes keep a pool name from being passed where a session id is
//! expected.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique name of a [`super::Pool`] within the [`super::Manager`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolName(String);

/// Identifier of a [`super::Session`], unique within its pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

macro_rules! string_id {
    ($ty:ident) => {
        impl $ty {
            /// Creates the identifier from any string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $ty {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $ty {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<$ty> for String {
            fn from(id: $ty) -> Self {
                id.0
            }
        }

        impl Borrow<str> for $ty {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(PoolName);
string_id!(SessionId);

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn display_is_raw_string() {
        assert_eq!(PoolName::from("room1").to_string(), "room1");
        assert_eq!(SessionId::new("A").to_string(), "A");
    }

    #[test]
    fn serde_is_transparent() {
        let Ok(json) = serde_json::to_string(&PoolName::from("room1")) else {
            panic!("serialization failed");
        };
        assert_eq!(json, "\"room1\"");
    }

    #[test]
    fn borrow_allows_str_lookup() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(SessionId::from("A"), 1);
        assert_eq!(map.get("A"), Some(&1));
        assert_eq!(map.get("B"), None);
    }
}
