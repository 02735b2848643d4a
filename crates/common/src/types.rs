//! Identifier newtypes for the session aggregate.
//!
//! Identifiers are issued by the backend and treated as opaque strings.
//! Session and participant ids are UUIDs in practice while meeting ids come
//! from the conferencing provider, so none of them are parsed.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a backend-issued identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

opaque_id!(
    /// Unique identifier for a session (a class or course).
    SessionId
);

opaque_id!(
    /// Unique identifier for a participant within a session.
    ParticipantId
);

opaque_id!(
    /// Identifier of a meeting, as issued by the conferencing provider.
    MeetingId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = MeetingId::new("85746065432");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"85746065432\"");

        let parsed: SessionId = serde_json::from_str("\"abc\"").unwrap_or_else(|_| "x".into());
        assert_eq!(parsed.as_str(), "abc");
    }

    #[test]
    fn test_display_matches_inner_value() {
        let id = ParticipantId::from("p-1");
        assert_eq!(id.to_string(), "p-1");
    }
}
