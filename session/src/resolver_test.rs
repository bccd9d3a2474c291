use super::*;
use crate::store::MemoryStore;
use crate::test_helpers::{MockBackend, ann, ann_token, credential, unavailable};

fn resolver_with(backend: MockBackend, store: &Arc<MemoryStore>) -> (IdentityResolver, Arc<MockBackend>) {
    let backend = Arc::new(backend);
    let resolver = IdentityResolver::new(backend.clone(), store.clone());
    (resolver, backend)
}

// =============================================================================
// Step 1: backend
// =============================================================================

#[tokio::test]
async fn backend_identity_taken_as_is() {
    let store = Arc::new(MemoryStore::new());
    let mut remote = ann();
    remote.extra.insert("id".into(), serde_json::json!(42));
    let (resolver, backend) = resolver_with(MockBackend::returning(remote.clone()), &store);

    let resolved = resolver.resolve(&credential("opaque")).await.unwrap();
    assert_eq!(resolved.identity, remote);
    assert_eq!(resolved.source, IdentitySource::Backend);
    assert_eq!(resolved.absorbed, None);
    assert_eq!(backend.me_calls(), 1);
    assert_eq!(backend.bearers(), vec![Some("opaque".to_owned())]);
}

#[tokio::test]
async fn resolve_is_idempotent_for_unchanged_backend() {
    let store = Arc::new(MemoryStore::new());
    let (resolver, _) = resolver_with(MockBackend::returning(ann()), &store);
    let first = resolver.resolve(&credential("opaque")).await.unwrap();
    let second = resolver.resolve(&credential("opaque")).await.unwrap();
    assert_eq!(first, second);
}

// =============================================================================
// Step 2: unverified claims
// =============================================================================

#[tokio::test]
async fn backend_failure_falls_back_to_claims() {
    let store = Arc::new(MemoryStore::new());
    let (resolver, _) = resolver_with(MockBackend::failing(unavailable()), &store);

    let resolved = resolver.resolve(&credential(&ann_token())).await.unwrap();
    assert_eq!(resolved.identity.name.as_deref(), Some("Ann"));
    assert_eq!(resolved.identity.email.as_deref(), Some("a@x.com"));
    assert_eq!(resolved.identity.picture.as_deref(), Some("p.png"));
    assert_eq!(resolved.source, IdentitySource::UnverifiedClaims);
    assert_eq!(resolved.absorbed, Some(unavailable()));
}

#[tokio::test]
async fn rejected_status_also_falls_back() {
    let store = Arc::new(MemoryStore::new());
    let rejected = BackendError::Rejected { status: 502, body: String::new() };
    let (resolver, _) = resolver_with(MockBackend::failing(rejected.clone()), &store);

    let resolved = resolver.resolve(&credential(&ann_token())).await.unwrap();
    assert_eq!(resolved.source, IdentitySource::UnverifiedClaims);
    assert_eq!(resolved.absorbed, Some(rejected));
}

// =============================================================================
// Step 3: terminal failure
// =============================================================================

#[tokio::test]
async fn undecodable_credential_propagates_original_backend_error() {
    let store = Arc::new(MemoryStore::new());
    let (resolver, _) = resolver_with(MockBackend::failing(unavailable()), &store);

    let err = resolver.resolve(&credential("opaque-session-id")).await.unwrap_err();
    assert_eq!(err.backend_error(), &unavailable());
    assert!(matches!(
        err,
        ResolveError::ResolutionFailed { decode: Some(MalformedToken::SegmentCount { found: 1 }), .. }
    ));
}

#[tokio::test]
async fn disabled_fallback_fails_without_decoding() {
    let store = Arc::new(MemoryStore::new());
    let (resolver, _) = resolver_with(MockBackend::failing(unavailable()), &store);
    let resolver = resolver.with_unverified_fallback(false);

    let err = resolver.resolve(&credential(&ann_token())).await.unwrap_err();
    assert_eq!(err, ResolveError::ResolutionFailed { source: unavailable(), decode: None });
}

// =============================================================================
// Picture override
// =============================================================================

#[tokio::test]
async fn cached_picture_overrides_backend_picture() {
    let store = Arc::new(MemoryStore::new());
    store.save_picture("data:image/png;base64,AAAA").unwrap();
    let mut remote = ann();
    remote.picture = Some("https://cdn.example/ann.png".into());
    let (resolver, _) = resolver_with(MockBackend::returning(remote), &store);

    let resolved = resolver.resolve(&credential("opaque")).await.unwrap();
    assert_eq!(resolved.identity.picture.as_deref(), Some("data:image/png;base64,AAAA"));
}

#[tokio::test]
async fn cached_picture_overrides_claims_picture() {
    let store = Arc::new(MemoryStore::new());
    store.save_picture("data:image/png;base64,BBBB").unwrap();
    let (resolver, _) = resolver_with(MockBackend::failing(unavailable()), &store);

    let resolved = resolver.resolve(&credential(&ann_token())).await.unwrap();
    assert_eq!(resolved.identity.picture.as_deref(), Some("data:image/png;base64,BBBB"));
}

#[tokio::test]
async fn cached_picture_applies_when_backend_has_none() {
    let store = Arc::new(MemoryStore::new());
    store.save_picture("data:image/png;base64,CCCC").unwrap();
    let (resolver, _) = resolver_with(MockBackend::returning(ann()), &store);

    let resolved = resolver.resolve(&credential("opaque")).await.unwrap();
    assert_eq!(resolved.identity.picture.as_deref(), Some("data:image/png;base64,CCCC"));
    assert_eq!(resolver.cached_picture().as_deref(), Some("data:image/png;base64,CCCC"));
}
