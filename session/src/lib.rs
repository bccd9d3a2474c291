//! Client-side session engine for WalkFit.
//!
//! SYSTEM CONTEXT
//! ==============
//! Keeps one answer to "who is logged in" consistent across a persisted
//! credential, a remote identity backend that may be unreachable, and a
//! locally cached profile picture. Consumers hold a [`SessionController`]
//! and observe [`SessionState`] / [`SessionEvent`]s; they never touch the
//! store or backend directly.
//!
//! ARCHITECTURE
//! ============
//! - [`store`]: durable credential + picture override (memory or file).
//! - [`backend`]: identity endpoints over HTTP, behind a trait for tests.
//! - [`resolver`]: backend first, unverified token claims second.
//! - [`controller`]: the session state machine with epoch-based superseding.
//! - [`picture`]: boundary checks for picture uploads.

pub mod backend;
pub mod config;
pub mod controller;
pub mod identity;
pub mod picture;
pub mod resolver;
pub mod state;
pub mod store;

#[cfg(test)]
mod test_helpers;

pub use backend::{BackendError, HttpBackend, IdentityBackend};
pub use config::{ConfigError, SessionConfig};
pub use controller::{SessionController, SessionError};
pub use identity::{Credential, IdentitySource, UserIdentity};
pub use picture::{PictureError, PictureUpload};
pub use resolver::{IdentityResolver, ResolveError, Resolved};
pub use state::{RouteAccess, SessionEvent, SessionPhase, SessionState};
pub use store::{CredentialStore, FileStore, MemoryStore, StoreError};
