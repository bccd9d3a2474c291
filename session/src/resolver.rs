//! Identity resolution: backend first, unverified token claims second.
//!
//! ARCHITECTURE
//! ============
//! 1. `who_am_i` against the backend; success is taken as-is.
//! 2. Any backend error falls through to decoding the credential's payload.
//! 3. If that fails too, the original backend error is returned.
//! Whichever path wins, a cached picture override replaces `picture`.
//!
//! TRADE-OFFS
//! ==========
//! Step 2 trusts an unsigned payload for display. Results from it are tagged
//! `IdentitySource::UnverifiedClaims`, and the step can be switched off.

use std::sync::Arc;

use claims::MalformedToken;

use crate::backend::{BackendError, IdentityBackend};
use crate::identity::{Credential, IdentitySource, UserIdentity};
use crate::store::CredentialStore;

/// Terminal failure of one resolution attempt: no usable identity at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("identity resolution failed: {source}")]
    ResolutionFailed {
        /// The backend error that started the fallback chain.
        source: BackendError,
        /// Why the claims fallback failed, when it was attempted.
        decode: Option<MalformedToken>,
    },
}

impl ResolveError {
    #[must_use]
    pub fn backend_error(&self) -> &BackendError {
        match self {
            Self::ResolutionFailed { source, .. } => source,
        }
    }
}

/// A successfully resolved identity and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub identity: UserIdentity,
    pub source: IdentitySource,
    /// Backend error swallowed by the claims fallback, if any.
    pub absorbed: Option<BackendError>,
}

#[derive(Clone)]
pub struct IdentityResolver {
    backend: Arc<dyn IdentityBackend>,
    store: Arc<dyn CredentialStore>,
    unverified_fallback: bool,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(backend: Arc<dyn IdentityBackend>, store: Arc<dyn CredentialStore>) -> Self {
        Self { backend, store, unverified_fallback: true }
    }

    /// Enable or disable the unverified-claims fallback (step 2).
    #[must_use]
    pub fn with_unverified_fallback(mut self, enabled: bool) -> Self {
        self.unverified_fallback = enabled;
        self
    }

    /// Resolve `credential` into an identity, degrading through the fallback chain.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::ResolutionFailed`] carrying the original backend
    /// error when neither the backend nor the token payload yields an identity.
    pub async fn resolve(&self, credential: &Credential) -> Result<Resolved, ResolveError> {
        let Resolved { identity, source, absorbed } = match self.backend.who_am_i(credential).await {
            Ok(identity) => Resolved { identity, source: IdentitySource::Backend, absorbed: None },
            Err(backend_error) => self.fall_back_to_claims(credential, backend_error)?,
        };

        Ok(Resolved { identity: identity.with_picture_override(self.cached_picture()), source, absorbed })
    }

    fn fall_back_to_claims(
        &self,
        credential: &Credential,
        backend_error: BackendError,
    ) -> Result<Resolved, ResolveError> {
        if !self.unverified_fallback {
            return Err(ResolveError::ResolutionFailed { source: backend_error, decode: None });
        }

        match claims::decode_unverified(credential.expose()) {
            Ok(claims) => {
                tracing::warn!(error = %backend_error, "backend identity lookup failed; using unverified token claims");
                Ok(Resolved {
                    identity: UserIdentity::from_claims(&claims),
                    source: IdentitySource::UnverifiedClaims,
                    absorbed: Some(backend_error),
                })
            }
            Err(decode_error) => {
                tracing::debug!(error = %decode_error, "credential payload is not decodable");
                Err(ResolveError::ResolutionFailed { source: backend_error, decode: Some(decode_error) })
            }
        }
    }

    /// The cached picture override. Store failures read as "no override".
    #[must_use]
    pub fn cached_picture(&self) -> Option<String> {
        match self.store.load_picture() {
            Ok(picture) => picture,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read cached profile picture");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;
