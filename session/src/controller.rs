//! Session controller: the single owner of "who is logged in".
//!
//! SYSTEM CONTEXT
//! ==============
//! Constructed once and cloned into every consumer. It holds the credential
//! store, the backend client and the identity resolver, and publishes
//! [`SessionState`] through a `watch` channel plus [`SessionEvent`]s through a
//! `broadcast` channel. All mutation goes through its operations.
//!
//! DESIGN
//! ======
//! Every login, logout and revocation bumps the session epoch. Resolutions
//! capture the epoch before awaiting the backend and only apply their result
//! if it is unchanged, so a logout always wins over an in-flight lookup.
//! State is only mutated inside `send_modify`/`send_if_modified` closures,
//! never across an `.await`. Store writes tied to a transition happen inside
//! the same closure so the store and the published state move together.
//!
//! ERROR HANDLING
//! ==============
//! Store failures are logged and absorbed; the in-memory session stays usable.
//! A 401 from the backend clears the session and emits
//! [`SessionEvent::Unauthorized`] instead of surfacing an error to each caller.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::backend::{BackendError, HttpBackend, IdentityBackend};
use crate::config::SessionConfig;
use crate::identity::{Credential, IdentitySource, UserIdentity};
use crate::picture::{PictureError, PictureUpload};
use crate::resolver::{IdentityResolver, ResolveError, Resolved};
use crate::state::{SessionEvent, SessionPhase, SessionState};
use crate::store::{CredentialStore, FileStore};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("login requires a non-empty credential")]
    InvalidLoginArgument,
    #[error(transparent)]
    ResolutionFailed(#[from] ResolveError),
    #[error("no active session")]
    NotAuthenticated,
    #[error("invalid picture: {0}")]
    InvalidPicture(#[from] PictureError),
}

/// What to do with the credential when resolution fails outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePolicy {
    /// Startup: a stored credential nobody can resolve is dropped.
    DropCredential,
    /// Login and refresh: keep it so the caller can retry.
    KeepCredential,
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    backend: Arc<dyn IdentityBackend>,
    resolver: IdentityResolver,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, backend: Arc<dyn IdentityBackend>) -> Self {
        Self::build(store, backend, true)
    }

    /// Wire a [`FileStore`] and an [`HttpBackend`] from parsed config.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn from_config(config: &SessionConfig) -> Result<Self, BackendError> {
        let backend = HttpBackend::from_config(config)?;
        let store = FileStore::new(config.state_dir.clone());
        Ok(Self::build(Arc::new(store), Arc::new(backend), config.unverified_fallback))
    }

    fn build(store: Arc<dyn CredentialStore>, backend: Arc<dyn IdentityBackend>, unverified_fallback: bool) -> Self {
        let resolver = IdentityResolver::new(backend.clone(), store.clone()).with_unverified_fallback(unverified_fallback);
        let (state, _) = watch::channel(SessionState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { inner: Arc::new(Inner { store, backend, resolver, state, events }) }
    }

    // =========================================================================
    // OBSERVATION
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until startup has settled and return the state at that point.
    /// Never completes if `start` is never called.
    pub async fn ready(&self) -> SessionState {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Restore the persisted session. Runs once; later calls are no-ops.
    pub async fn start(&self) {
        let mut claimed_epoch = None;
        self.inner.state.send_if_modified(|state| {
            if state.phase != SessionPhase::Uninitialized {
                return false;
            }
            state.phase = SessionPhase::Loading;
            claimed_epoch = Some(state.epoch);
            true
        });
        let Some(epoch) = claimed_epoch else {
            tracing::debug!("session already started");
            return;
        };

        let stored = self.inner.store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to read stored credential; starting signed out");
            None
        });

        let Some(credential) = stored else {
            let applied = self.apply_if_current(epoch, |state| {
                state.phase = SessionPhase::Unauthenticated;
                state.loading = false;
            });
            if applied {
                self.emit(SessionEvent::Ready { authenticated: false });
            }
            return;
        };

        self.apply_if_current(epoch, |state| state.credential = Some(credential.clone()));
        let outcome = self.inner.resolver.resolve(&credential).await;
        if let Some(result) = self.settle(epoch, outcome, FailurePolicy::DropCredential) {
            if let Err(e) = result {
                tracing::info!(error = %e, "stored credential could not be resolved; starting signed out");
            }
            let authenticated = self.inner.state.borrow().is_authenticated();
            self.emit(SessionEvent::Ready { authenticated });
        }
    }

    /// Adopt `raw` as the session credential and resolve its identity.
    ///
    /// Returns `Ok(None)` when a newer login or a logout superseded this one
    /// before the identity arrived.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidLoginArgument`] for a blank credential (nothing
    /// changes), or [`SessionError::ResolutionFailed`] when no identity could
    /// be obtained. The credential stays set in the latter case.
    pub async fn login(&self, raw: &str) -> Result<Option<UserIdentity>, SessionError> {
        let Some(credential) = Credential::parse(raw) else {
            tracing::error!("login called with an empty credential");
            return Err(SessionError::InvalidLoginArgument);
        };

        let mut epoch = 0;
        self.inner.state.send_modify(|state| {
            state.epoch += 1;
            epoch = state.epoch;
            state.credential = Some(credential.clone());
            state.identity = None;
            state.identity_source = None;
            state.phase = SessionPhase::Authenticated;
            state.loading = false;
            self.persist_credential(&credential);
        });
        self.emit(SessionEvent::LoggedIn);

        let outcome = self.inner.resolver.resolve(&credential).await;
        self.settle(epoch, outcome, FailurePolicy::KeepCredential)
            .transpose()
    }

    /// Exchange an identity-provider token at the backend, then log in with
    /// whatever credential comes back. Falls back to the provider token when
    /// the exchange fails or issues nothing.
    ///
    /// # Errors
    ///
    /// Same as [`SessionController::login`].
    pub async fn login_with_provider_token(&self, raw: &str) -> Result<Option<UserIdentity>, SessionError> {
        let Some(provider_token) = Credential::parse(raw) else {
            tracing::error!("provider login called with an empty token");
            return Err(SessionError::InvalidLoginArgument);
        };

        let (bearer, epoch) = {
            let state = self.inner.state.borrow();
            (state.credential.clone(), state.epoch)
        };

        let credential = match self.inner.backend.verify(&provider_token, bearer.as_ref()).await {
            Ok(Some(issued)) => issued,
            Ok(None) => {
                tracing::warn!("backend issued no credential; using provider token");
                provider_token
            }
            Err(e) => {
                if e.is_unauthorized() && bearer.is_some() {
                    self.revoke(epoch);
                }
                tracing::warn!(error = %e, "token exchange failed; using provider token");
                provider_token
            }
        };

        self.login(credential.expose()).await
    }

    /// Re-run identity resolution for the current credential. While startup
    /// is still resolving, waits for it to settle first.
    ///
    /// Returns `Ok(None)` when the session changed while resolving.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotAuthenticated`] without a credential, or
    /// [`SessionError::ResolutionFailed`] (credential and current identity kept).
    pub async fn refresh_identity(&self) -> Result<Option<UserIdentity>, SessionError> {
        // Startup owns `loading`; only the startup result may clear it.
        if self.inner.state.borrow().phase == SessionPhase::Loading {
            self.ready().await;
        }

        let (credential, epoch) = {
            let state = self.inner.state.borrow();
            (state.credential.clone(), state.epoch)
        };
        let Some(credential) = credential else {
            return Err(SessionError::NotAuthenticated);
        };

        let outcome = self.inner.resolver.resolve(&credential).await;
        self.settle(epoch, outcome, FailurePolicy::KeepCredential)
            .transpose()
    }

    /// End the session. The cached picture is kept.
    pub async fn logout(&self) {
        self.end_session(false).await;
    }

    /// End the session and forget the cached picture too.
    pub async fn logout_clearing_picture(&self) {
        self.end_session(true).await;
    }

    async fn end_session(&self, forget_picture: bool) {
        let mut previous = None;
        self.inner.state.send_modify(|state| {
            state.epoch += 1;
            previous = state.credential.take();
            state.identity = None;
            state.identity_source = None;
            state.phase = SessionPhase::Unauthenticated;
            state.loading = false;
            self.forget_credential();
            if forget_picture {
                self.forget_picture();
            }
        });
        self.emit(SessionEvent::LoggedOut);

        // Local state is already gone; the backend call is advisory.
        if let Err(e) = self.inner.backend.logout(previous.as_ref()).await {
            tracing::warn!(error = %e, "backend logout failed");
        }
    }

    // =========================================================================
    // IDENTITY EDITS
    // =========================================================================

    /// Replace the current identity without asking the backend. A cached
    /// picture override still wins over `identity.picture`.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotAuthenticated`] without a credential.
    pub fn update_user(&self, identity: UserIdentity) -> Result<(), SessionError> {
        let identity = identity.with_picture_override(self.inner.resolver.cached_picture());
        let updated = self.inner.state.send_if_modified(|state| {
            if state.credential.is_none() {
                return false;
            }
            state.identity_source = Some(state.identity_source.unwrap_or(IdentitySource::Backend));
            state.identity = Some(identity);
            true
        });
        if !updated {
            return Err(SessionError::NotAuthenticated);
        }
        self.emit(SessionEvent::IdentityUpdated);
        Ok(())
    }

    /// Validate an uploaded picture, cache it as the override and show it.
    ///
    /// Returns the updated identity, or `None` when no identity is loaded yet
    /// (the override applies on the next resolution).
    ///
    /// # Errors
    ///
    /// [`SessionError::NotAuthenticated`] without a credential, or
    /// [`SessionError::InvalidPicture`] when the upload fails the boundary checks.
    pub fn update_picture(&self, upload: PictureUpload) -> Result<Option<UserIdentity>, SessionError> {
        if !self.inner.state.borrow().is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        let data_url = upload.into_data_url()?;

        let mut outcome = Err(SessionError::NotAuthenticated);
        self.inner.state.send_if_modified(|state| {
            if state.credential.is_none() {
                return false;
            }
            self.persist_picture(&data_url);
            let Some(identity) = state.identity.as_mut() else {
                outcome = Ok(None);
                return false;
            };
            identity.picture = Some(data_url);
            outcome = Ok(Some(identity.clone()));
            true
        });
        if matches!(outcome, Ok(Some(_))) {
            self.emit(SessionEvent::IdentityUpdated);
        }
        outcome
    }

    /// Forget the cached picture override. The identity on display keeps its
    /// picture until the next resolution.
    pub fn clear_picture(&self) {
        self.forget_picture();
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Apply `f` only if no login, logout or revocation happened since
    /// `epoch` was captured.
    fn apply_if_current(&self, epoch: u64, f: impl FnOnce(&mut SessionState)) -> bool {
        self.inner.state.send_if_modified(|state| {
            if state.epoch != epoch {
                return false;
            }
            f(state);
            true
        })
    }

    /// Fold a resolution outcome into the state. `None` means the result was
    /// stale and discarded.
    fn settle(
        &self,
        epoch: u64,
        outcome: Result<Resolved, ResolveError>,
        policy: FailurePolicy,
    ) -> Option<Result<UserIdentity, SessionError>> {
        let outcome = match outcome {
            Ok(resolved) if resolved.absorbed.as_ref().is_some_and(BackendError::is_unauthorized) => {
                Err(ResolveError::ResolutionFailed { source: BackendError::Unauthorized, decode: None })
            }
            other => other,
        };

        match outcome {
            Ok(Resolved { identity, source, .. }) => {
                let applied = self.apply_if_current(epoch, |state| {
                    state.identity = Some(identity.clone());
                    state.identity_source = Some(source);
                    state.phase = SessionPhase::Authenticated;
                    state.loading = false;
                });
                if !applied {
                    tracing::debug!("discarding stale identity resolution");
                    return None;
                }
                self.emit(SessionEvent::IdentityResolved { source });
                Some(Ok(identity))
            }
            Err(e) if e.backend_error().is_unauthorized() => {
                if !self.revoke(epoch) {
                    tracing::debug!("discarding stale unauthorized response");
                    return None;
                }
                Some(Err(e.into()))
            }
            Err(e) => match policy {
                FailurePolicy::DropCredential => {
                    let applied = self.apply_if_current(epoch, |state| {
                        state.credential = None;
                        state.identity = None;
                        state.identity_source = None;
                        state.phase = SessionPhase::Unauthenticated;
                        state.loading = false;
                        self.forget_credential();
                    });
                    applied.then(|| Err(e.into()))
                }
                FailurePolicy::KeepCredential => {
                    if self.inner.state.borrow().epoch != epoch {
                        return None;
                    }
                    tracing::warn!(error = %e, "identity unavailable for current credential");
                    self.emit(SessionEvent::IdentityUnavailable { message: unavailable_message(&e) });
                    Some(Err(e.into()))
                }
            },
        }
    }

    /// The backend rejected the credential captured at `epoch`: clear the
    /// session locally and announce it.
    fn revoke(&self, epoch: u64) -> bool {
        let applied = self.apply_if_current(epoch, |state| {
            state.epoch += 1;
            state.credential = None;
            state.identity = None;
            state.identity_source = None;
            state.phase = SessionPhase::Unauthenticated;
            state.loading = false;
            self.forget_credential();
        });
        if applied {
            tracing::warn!("backend rejected the session credential; signed out");
            self.emit(SessionEvent::Unauthorized);
        }
        applied
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    // =========================================================================
    // STORE
    // =========================================================================

    fn persist_credential(&self, credential: &Credential) {
        if let Err(e) = self.inner.store.save(credential) {
            tracing::warn!(error = %e, "failed to persist credential; session will not survive restart");
        }
    }

    fn persist_picture(&self, data_url: &str) {
        if let Err(e) = self.inner.store.save_picture(data_url) {
            tracing::warn!(error = %e, "failed to cache profile picture; change will not survive restart");
        }
    }

    fn forget_credential(&self) {
        if let Err(e) = self.inner.store.clear() {
            tracing::warn!(error = %e, "failed to clear stored credential");
        }
    }

    fn forget_picture(&self) {
        if let Err(e) = self.inner.store.clear_picture() {
            tracing::warn!(error = %e, "failed to clear cached profile picture");
        }
    }
}

fn unavailable_message(error: &ResolveError) -> String {
    match error.backend_error() {
        BackendError::Unavailable(_) => {
            "Could not reach the server to load your profile. Check your connection and try again.".to_owned()
        }
        other => format!("Could not load your profile ({other}). Try again shortly."),
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
