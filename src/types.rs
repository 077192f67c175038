//! Basic type definitions for the bridge
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: UUID-based downstream consumer identifier
//! - `RoomId`: public room identifier as sent by the consumer

use std::fmt;

use serde::{Deserialize, Deserializer};
use uuid::Uuid;

/// Unique downstream consumer identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe consumer identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public room identifier
///
/// Consumers may send it as a JSON string or a JSON number; both are kept
/// in textual form and passed to the resolver unchanged (trimmed).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => RoomId::new(s),
            Raw::Unsigned(n) => RoomId(n.to_string()),
            Raw::Signed(n) => RoomId(n.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_unique() {
        let id1 = ClientId::new();
        let id2 = ClientId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_room_id_from_string_or_number() {
        let a: RoomId = serde_json::from_str(r#""  123 ""#).unwrap();
        let b: RoomId = serde_json::from_str("123").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "123");
    }

    #[test]
    fn test_room_id_blank() {
        assert!(RoomId::new("   ").is_blank());
        assert!(!RoomId::new("7").is_blank());
    }
}
