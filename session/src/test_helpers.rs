//! Scripted collaborators shared by the unit tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

use crate::backend::{BackendError, IdentityBackend};
use crate::identity::{Credential, UserIdentity};

// =========================================================================
// MockBackend
// =========================================================================

/// Pauses `who_am_i` until the test releases it.
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until a `who_am_i` call is parked on the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one parked call continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

pub struct MockBackend {
    me: Mutex<Result<UserIdentity, BackendError>>,
    verify: Mutex<Result<Option<Credential>, BackendError>>,
    logout: Mutex<Result<(), BackendError>>,
    me_calls: AtomicUsize,
    verify_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    bearers: Mutex<Vec<Option<String>>>,
    gate: Option<Arc<Gate>>,
}

impl MockBackend {
    fn with_me(me: Result<UserIdentity, BackendError>) -> Self {
        Self {
            me: Mutex::new(me),
            verify: Mutex::new(Ok(None)),
            logout: Mutex::new(Ok(())),
            me_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            bearers: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// `who_am_i` succeeds with `identity`.
    pub fn returning(identity: UserIdentity) -> Self {
        Self::with_me(Ok(identity))
    }

    /// `who_am_i` fails with `error`.
    pub fn failing(error: BackendError) -> Self {
        Self::with_me(Err(error))
    }

    /// Park every `who_am_i` call on a gate the test controls.
    pub fn gated(mut self) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn set_me(&self, me: Result<UserIdentity, BackendError>) {
        *self.me.lock().unwrap() = me;
    }

    pub fn set_verify(&self, verify: Result<Option<Credential>, BackendError>) {
        *self.verify.lock().unwrap() = verify;
    }

    pub fn set_logout(&self, logout: Result<(), BackendError>) {
        *self.logout.lock().unwrap() = logout;
    }

    pub fn me_calls(&self) -> usize {
        self.me_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    /// Bearer credentials presented on each call, in order.
    pub fn bearers(&self) -> Vec<Option<String>> {
        self.bearers.lock().unwrap().clone()
    }

    fn record(&self, bearer: Option<&Credential>) {
        self.bearers
            .lock()
            .unwrap()
            .push(bearer.map(|c| c.expose().to_owned()));
    }
}

#[async_trait::async_trait]
impl IdentityBackend for MockBackend {
    async fn verify(
        &self,
        _provider_token: &Credential,
        bearer: Option<&Credential>,
    ) -> Result<Option<Credential>, BackendError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.record(bearer);
        self.verify.lock().unwrap().clone()
    }

    async fn who_am_i(&self, bearer: &Credential) -> Result<UserIdentity, BackendError> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        self.record(Some(bearer));
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.me.lock().unwrap().clone()
    }

    async fn logout(&self, bearer: Option<&Credential>) -> Result<(), BackendError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.record(bearer);
        self.logout.lock().unwrap().clone()
    }
}

// =========================================================================
// Fixtures
// =========================================================================

pub fn ann() -> UserIdentity {
    UserIdentity { name: Some("Ann".into()), email: Some("a@x.com".into()), ..UserIdentity::default() }
}

/// Unsigned token whose payload carries `claims`.
pub fn token_for(payload: serde_json::Value) -> String {
    let serde_json::Value::Object(map) = payload else {
        panic!("claims fixture must be a JSON object");
    };
    claims::encode_unsigned(&map)
}

/// Token decoding to `{name:"Ann", email:"a@x.com", picture:"p.png"}`.
pub fn ann_token() -> String {
    token_for(serde_json::json!({ "name": "Ann", "email": "a@x.com", "picture": "p.png" }))
}

pub fn credential(raw: &str) -> Credential {
    Credential::parse(raw).expect("credential fixture")
}

pub fn unavailable() -> BackendError {
    BackendError::Unavailable("connection refused".into())
}
