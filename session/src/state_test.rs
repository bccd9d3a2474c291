use super::*;

fn signed_in() -> SessionState {
    SessionState {
        credential: Credential::parse("abc"),
        loading: false,
        phase: SessionPhase::Authenticated,
        ..SessionState::default()
    }
}

#[test]
fn initial_state_is_loading_and_uninitialized() {
    let state = SessionState::default();
    assert!(state.is_loading());
    assert_eq!(state.phase(), SessionPhase::Uninitialized);
    assert!(!state.is_authenticated());
    assert_eq!(state.identity(), None);
    assert_eq!(state.epoch, 0);
}

#[test]
fn route_access_pending_while_loading() {
    let mut state = signed_in();
    state.loading = true;
    assert_eq!(state.route_access(), RouteAccess::Pending);
}

#[test]
fn route_access_granted_with_credential() {
    assert_eq!(signed_in().route_access(), RouteAccess::Granted);
}

#[test]
fn route_access_redirects_without_credential() {
    let state = SessionState { loading: false, phase: SessionPhase::Unauthenticated, ..SessionState::default() };
    assert_eq!(state.route_access(), RouteAccess::RedirectToLogin);
}

#[test]
fn authenticated_means_credential_present_even_without_identity() {
    let state = signed_in();
    assert!(state.is_authenticated());
    assert!(state.identity().is_none());
}

#[test]
fn degraded_only_for_unverified_claims() {
    let mut state = signed_in();
    assert!(!state.is_degraded());
    state.identity_source = Some(IdentitySource::Backend);
    assert!(!state.is_degraded());
    state.identity_source = Some(IdentitySource::UnverifiedClaims);
    assert!(state.is_degraded());
}

#[test]
fn phase_names_are_stable() {
    assert_eq!(SessionPhase::Uninitialized.as_str(), "uninitialized");
    assert_eq!(SessionPhase::Loading.as_str(), "loading");
    assert_eq!(SessionPhase::Authenticated.as_str(), "authenticated");
    assert_eq!(SessionPhase::Unauthenticated.as_str(), "unauthenticated");
}
