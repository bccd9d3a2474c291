//! Credential and user-identity records shared by the store, resolver and
//! session controller.
//!
//! DESIGN
//! ======
//! Backends hand back loosely shaped user objects. `UserIdentity` keeps the
//! fields the app renders as typed options and parks everything else in an
//! explicit `extra` map, so unknown attributes survive a round-trip without
//! the record turning into an untyped bag.

use std::fmt;
use std::sync::Arc;

use claims::{DecodedClaims, claim_str};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// CREDENTIAL
// =============================================================================

/// Opaque bearer credential. Never empty.
///
/// Cloning shares the underlying string. `Debug` is redacted so the value
/// cannot leak through logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    /// Parse a raw credential, trimming surrounding whitespace.
    /// Returns `None` when nothing is left.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(Arc::from(trimmed)))
    }

    /// The raw bearer string, for `Authorization` headers and persistence.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

// =============================================================================
// USER IDENTITY
// =============================================================================

/// The "current user" record rendered by the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Picture URL or `data:` URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Any other backend-supplied attribute, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserIdentity {
    /// Synthesize an identity from unverified token claims.
    ///
    /// Only `name`, `email` and `picture` are taken; the rest of the payload
    /// (issuer, audience, timestamps) is token plumbing, not user data.
    #[must_use]
    pub fn from_claims(claims: &DecodedClaims) -> Self {
        Self {
            name: claim_str(claims, "name").map(str::to_owned),
            email: claim_str(claims, "email").map(str::to_owned),
            picture: claim_str(claims, "picture").map(str::to_owned),
            extra: Map::new(),
        }
    }

    /// Replace `picture` with a locally cached override, when there is one.
    #[must_use]
    pub fn with_picture_override(mut self, cached: Option<String>) -> Self {
        if let Some(picture) = cached {
            self.picture = Some(picture);
        }
        self
    }
}

/// Where the current identity record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// Returned by the backend for this credential.
    Backend,
    /// Decoded locally from the token payload. Unverified; display only.
    UnverifiedClaims,
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
