//! Typed ID wrappers for the tracking pipeline.
//!
//! IDs are opaque String wrappers (serde-transparent). The backend generates
//! session identifiers; the client only stores and echoes them, so the only
//! requirement on this side is String.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Create a new ID using UUID v4 (random).
            pub fn new_uuid() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Opaque per-browser session identifier, minted by the backend.
    SessionId
);
typed_id!(
    /// Stable key for one logical video on a page (element id, embed id, or
    /// source URL — whatever the host can keep stable across signals).
    VideoId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_new_is_unique() {
        let a = SessionId::new_uuid();
        let b = SessionId::new_uuid();
        assert_ne!(a, b);
    }

    #[test]
    fn session_id_from_string() {
        let id = SessionId::from_string("visit-1");
        assert_eq!(id.as_str(), "visit-1");
        assert_eq!(id.to_string(), "visit-1");
    }

    #[test]
    fn typed_id_serde_is_transparent() {
        let id = VideoId::from_string("trailer-outbreak");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"trailer-outbreak\"");
        let back: VideoId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn typed_id_hash_equality() {
        use std::collections::HashSet;
        let a = SessionId::from_string("same");
        let b = SessionId::from_string("same");
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }
}
