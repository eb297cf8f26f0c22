//! Strongly-typed identifier value objects.
//!
//! Every identifier in the realtime core is an opaque, non-empty string
//! assigned by some other system (the transport, the session store, the
//! block store). Deserialization goes through `TryFrom<String>` so a blank
//! ID in an inbound command is rejected at parse time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::ValidationError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier, returning error if empty.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::empty_field($field));
                }
                Ok(Self(id))
            }

            /// Returns the inner string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id!(
    /// Opaque identifier of one realtime connection, assigned by the transport.
    ConnectionId,
    "connection_id"
);

string_id!(
    /// Identifier of a user, resolved from a session or bound by the host.
    UserId,
    "user_id"
);

string_id!(
    /// Identifier of a team (workspace), the coarse broadcast scope.
    TeamId,
    "team_id"
);

string_id!(
    /// Identifier of a block (board, card, view, ...).
    BlockId,
    "block_id"
);

/// User ID used for every connection in single-user deployments.
pub const SINGLE_USER_ID: &str = "single-user";

impl ConnectionId {
    /// Generates a fresh random connection ID (standalone transport).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl UserId {
    /// The well-known single-user identity.
    pub fn single_user() -> Self {
        Self(SINGLE_USER_ID.to_string())
    }

    /// Returns true if this is the well-known single-user identity.
    pub fn is_single_user(&self) -> bool {
        self.0 == SINGLE_USER_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_accepts_valid_string() {
        let id = UserId::new("user-123").unwrap();
        assert_eq!(id.as_str(), "user-123");
    }

    #[test]
    fn team_id_rejects_empty_string() {
        match TeamId::new("") {
            Err(ValidationError::EmptyField { field }) => assert_eq!(field, "team_id"),
            other => panic!("Expected EmptyField error, got {:?}", other),
        }
    }

    #[test]
    fn block_id_rejects_whitespace() {
        assert!(BlockId::new("   ").is_err());
    }

    #[test]
    fn generated_connection_ids_are_unique() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn ids_deserialize_from_plain_strings() {
        let id: BlockId = serde_json::from_str("\"block-1\"").unwrap();
        assert_eq!(id.as_str(), "block-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"block-1\"");
    }

    #[test]
    fn empty_id_fails_deserialization() {
        let result: Result<TeamId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn single_user_is_recognized() {
        assert!(UserId::single_user().is_single_user());
        assert!(!UserId::new("alice").unwrap().is_single_user());
    }
}
