//! Durable key-value persistence for the bearer credential and the cached
//! profile picture.
//!
//! SYSTEM CONTEXT
//! ==============
//! The store is the only state that outlives the process. Implementations
//! provide three raw key operations; the typed credential/picture helpers are
//! shared default methods so every backend applies the same parsing rules.
//!
//! TRADE-OFFS
//! ==========
//! Access is synchronous and unlocked across processes. Two processes sharing
//! one `FileStore` directory will not observe each other's logout until their
//! next `load`.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::identity::Credential;

// =============================================================================
// KEYS & ERRORS
// =============================================================================

/// Logical keys persisted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Credential,
    CachedProfilePicture,
}

impl StoreKey {
    /// Stable name used for on-disk files and log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credential => "credential",
            Self::CachedProfilePicture => "cachedProfilePicture",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io failed for {key}: {source}")]
    Io {
        key: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("stored value for {key} is not valid UTF-8")]
    Encoding { key: &'static str },
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Persistence contract used by the resolver and session controller.
pub trait CredentialStore: Send + Sync {
    /// Read the raw value for `key`. Absent keys are `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing medium fails.
    fn read(&self, key: StoreKey) -> Result<Option<String>, StoreError>;

    /// Durably write `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing medium fails.
    fn write(&self, key: StoreKey, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing medium fails.
    fn remove(&self, key: StoreKey) -> Result<(), StoreError>;

    /// Load the persisted credential. Blank values read as absent.
    ///
    /// # Errors
    ///
    /// Propagates [`CredentialStore::read`] failures.
    fn load(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .read(StoreKey::Credential)?
            .as_deref()
            .and_then(Credential::parse))
    }

    /// Persist `credential`.
    ///
    /// # Errors
    ///
    /// Propagates [`CredentialStore::write`] failures.
    fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        self.write(StoreKey::Credential, credential.expose())
    }

    /// Forget the persisted credential. The cached picture is unaffected.
    ///
    /// # Errors
    ///
    /// Propagates [`CredentialStore::remove`] failures.
    fn clear(&self) -> Result<(), StoreError> {
        self.remove(StoreKey::Credential)
    }

    /// Load the cached picture override. Empty values read as absent.
    ///
    /// # Errors
    ///
    /// Propagates [`CredentialStore::read`] failures.
    fn load_picture(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .read(StoreKey::CachedProfilePicture)?
            .filter(|picture| !picture.is_empty()))
    }

    /// Persist a picture override.
    ///
    /// # Errors
    ///
    /// Propagates [`CredentialStore::write`] failures.
    fn save_picture(&self, data: &str) -> Result<(), StoreError> {
        self.write(StoreKey::CachedProfilePicture, data)
    }

    /// Forget the picture override. The credential is unaffected.
    ///
    /// # Errors
    ///
    /// Propagates [`CredentialStore::remove`] failures.
    fn clear_picture(&self) -> Result<(), StoreError> {
        self.remove(StoreKey::CachedProfilePicture)
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<StoreKey, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn read(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(&key).cloned())
    }

    fn write(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key, value.to_owned());
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(&key);
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// One file per key under a state directory.
///
/// Writes land in a uniquely named sibling temp file that is renamed over the
/// target, so a crash mid-write leaves either the old value or the new one.
/// A failed write removes its temp file.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created lazily on the
    /// first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: StoreKey) -> PathBuf {
        self.dir.join(key.as_str())
    }
}

/// Distinguishes concurrent writers' staging files within one process.
static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

fn write_synced(path: &Path, value: &str) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(value.as_bytes())?;
    file.sync_all()
}

fn io_error(key: StoreKey) -> impl FnOnce(io::Error) -> StoreError {
    move |source| StoreError::Io { key: key.as_str(), source }
}

impl CredentialStore for FileStore {
    fn read(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        let bytes = match fs::read(self.path_for(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(key)(e)),
        };
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| StoreError::Encoding { key: key.as_str() })
    }

    fn write(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(io_error(key))?;

        let target = self.path_for(key);
        let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
        let staging = self.dir.join(format!(".{}.{}.{seq}.tmp", key.as_str(), std::process::id()));

        let written = write_synced(&staging, value).and_then(|()| fs::rename(&staging, &target));
        if written.is_err() {
            let _ = fs::remove_file(&staging);
        }
        written.map_err(io_error(key))
    }

    fn remove(&self, key: StoreKey) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key)(e)),
        }
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
