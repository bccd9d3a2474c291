//! Observable session state and the events the controller broadcasts.

use crate::identity::{Credential, IdentitySource, UserIdentity};

/// Lifecycle of a session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// `start` has not run yet.
    #[default]
    Uninitialized,
    /// Startup is resolving a stored credential.
    Loading,
    /// A credential is held. The identity may still be missing.
    Authenticated,
    Unauthenticated,
}

impl SessionPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Authenticated => "authenticated",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

/// Decision for a route that requires a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Startup has not settled; render a loading indicator.
    Pending,
    Granted,
    RedirectToLogin,
}

/// Snapshot of the session as seen by consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub(crate) credential: Option<Credential>,
    pub(crate) identity: Option<UserIdentity>,
    pub(crate) identity_source: Option<IdentitySource>,
    pub(crate) loading: bool,
    pub(crate) phase: SessionPhase,
    pub(crate) epoch: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            credential: None,
            identity: None,
            identity_source: None,
            loading: true,
            phase: SessionPhase::Uninitialized,
            epoch: 0,
        }
    }
}

impl SessionState {
    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    #[must_use]
    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn identity_source(&self) -> Option<IdentitySource> {
        self.identity_source
    }

    /// `true` until startup resolution has settled.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// A credential is held. Says nothing about whether it was verified.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    /// The identity on display came from unverified token claims.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.identity_source == Some(IdentitySource::UnverifiedClaims)
    }

    #[must_use]
    pub fn route_access(&self) -> RouteAccess {
        if self.loading {
            RouteAccess::Pending
        } else if self.is_authenticated() {
            RouteAccess::Granted
        } else {
            RouteAccess::RedirectToLogin
        }
    }
}

/// Notifications broadcast by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Startup settled.
    Ready { authenticated: bool },
    LoggedIn,
    IdentityResolved { source: IdentitySource },
    /// Resolution failed after login or refresh. `message` is user-facing.
    IdentityUnavailable { message: String },
    IdentityUpdated,
    LoggedOut,
    /// The backend rejected the credential and the session was cleared.
    /// Consumers should send the user back to login.
    Unauthorized,
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
