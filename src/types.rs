//! Basic type definitions for the chat hub
//!
//! Provides the `UserId` newtype: the numeric identity assigned once and
//! kept stable across reconnects through the reconnection token.

use serde::{Deserialize, Serialize};

/// Numeric user identifier (newtype pattern)
///
/// `0` is reserved for the system user that authors error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Identifier of the system user
    pub const SYSTEM: UserId = UserId(0);

    /// Whether this is the reserved system identifier
    pub fn is_system(self) -> bool {
        self == Self::SYSTEM
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
