//! Identifier types for the domain communication layer.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{define_id, IdError};

// =============================================================================
// Generated IDs
// =============================================================================

define_id!(
    /// Identity of one physical channel between the control plane and a worker.
    ///
    /// A domain keeps its name across reconnects; every reconnect gets a new
    /// `ConnectionId`.
    ConnectionId,
    "conn"
);

define_id!(
    /// Identity of one spawn of a managed worker process.
    WorkerRunId,
    "run"
);

// =============================================================================
// Request IDs
// =============================================================================

/// Maximum accepted length of a request ID, in bytes.
pub const MAX_REQUEST_ID_LEN: usize = 256;

/// Correlation token carried by every envelope.
///
/// Only required to be unique among the requests currently outstanding, so
/// any non-empty token is accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestId(String);

impl RequestId {
    /// Prefix used for generated request IDs.
    pub const PREFIX: &'static str = "req";

    /// Generates a fresh `req_{ulid}` token.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{}_{}", Self::PREFIX, crate::Ulid::new()))
    }

    /// Wraps a caller-chosen token.
    pub fn new(token: impl Into<String>) -> Result<Self, IdError> {
        let token = token.into();
        if token.is_empty() {
            return Err(IdError::Empty);
        }
        if token.len() > MAX_REQUEST_ID_LEN {
            return Err(IdError::TooLong {
                len: token.len(),
                max: MAX_REQUEST_ID_LEN,
            });
        }
        Ok(Self(token))
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RequestId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for RequestId {
    type Error = IdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RequestId> for String {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

impl Borrow<str> for RequestId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Domain Names
// =============================================================================

/// Maximum accepted length of a domain name, in bytes.
pub const MAX_DOMAIN_NAME_LEN: usize = 64;

/// Logical name of a worker domain (e.g. `users`, `email`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainName(String);

impl DomainName {
    /// Validates and wraps a domain name.
    ///
    /// Allowed characters are ASCII alphanumerics, `-`, `_` and `.`.
    pub fn new(name: impl Into<String>) -> Result<Self, IdError> {
        let name = name.into();
        if name.is_empty() {
            return Err(IdError::Empty);
        }
        if name.len() > MAX_DOMAIN_NAME_LEN {
            return Err(IdError::TooLong {
                len: name.len(),
                max: MAX_DOMAIN_NAME_LEN,
            });
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(IdError::InvalidDomainName {
                name,
                reason: "only ASCII letters, digits, '-', '_' and '.' are allowed",
            });
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DomainName {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DomainName {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for DomainName {
    type Error = IdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DomainName> for String {
    fn from(name: DomainName) -> Self {
        name.0
    }
}

impl Borrow<str> for DomainName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Tests
// =============================================================================
