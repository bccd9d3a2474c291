use super::*;

fn credential(raw: &str) -> Credential {
    Credential::parse(raw).expect("credential")
}

/// Behaviour every store must share, run against each implementation.
fn exercise_store(store: &dyn CredentialStore) {
    assert_eq!(store.load().unwrap(), None);
    assert_eq!(store.load_picture().unwrap(), None);

    store.save(&credential("tok-1")).unwrap();
    store.save_picture("data:image/png;base64,AAAA").unwrap();
    assert_eq!(store.load().unwrap(), Some(credential("tok-1")));
    assert_eq!(store.load_picture().unwrap().as_deref(), Some("data:image/png;base64,AAAA"));

    store.save(&credential("tok-2")).unwrap();
    assert_eq!(store.load().unwrap(), Some(credential("tok-2")));

    // Clearing the credential leaves the picture, and vice versa.
    store.clear().unwrap();
    assert_eq!(store.load().unwrap(), None);
    assert!(store.load_picture().unwrap().is_some());

    store.save(&credential("tok-3")).unwrap();
    store.clear_picture().unwrap();
    assert_eq!(store.load_picture().unwrap(), None);
    assert_eq!(store.load().unwrap(), Some(credential("tok-3")));

    // Removing absent keys is not an error.
    store.clear_picture().unwrap();
    store.clear().unwrap();
    store.clear().unwrap();
}

// =============================================================================
// MemoryStore
// =============================================================================

#[test]
fn memory_store_contract() {
    exercise_store(&MemoryStore::new());
}

#[test]
fn blank_values_read_as_absent() {
    let store = MemoryStore::new();
    store.write(StoreKey::Credential, "   ").unwrap();
    store.write(StoreKey::CachedProfilePicture, "").unwrap();
    assert_eq!(store.load().unwrap(), None);
    assert_eq!(store.load_picture().unwrap(), None);
}

// =============================================================================
// FileStore
// =============================================================================

#[test]
fn file_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    exercise_store(&FileStore::new(dir.path().join("state")));
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FileStore::new(dir.path());
        store.save(&credential("persisted")).unwrap();
        store.save_picture("data:image/gif;base64,R0lG").unwrap();
    }
    let reopened = FileStore::new(dir.path());
    assert_eq!(reopened.load().unwrap(), Some(credential("persisted")));
    assert_eq!(reopened.load_picture().unwrap().as_deref(), Some("data:image/gif;base64,R0lG"));
}

#[test]
fn file_store_uses_logical_key_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store.save(&credential("abc")).unwrap();
    store.save_picture("pic").unwrap();
    assert_eq!(std::fs::read_to_string(dir.path().join("credential")).unwrap(), "abc");
    assert_eq!(std::fs::read_to_string(dir.path().join("cachedProfilePicture")).unwrap(), "pic");
    assert!(staging_files(dir.path()).is_empty());
}

#[test]
fn file_store_missing_directory_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("never-created"));
    assert_eq!(store.load().unwrap(), None);
    store.clear().unwrap();
}

#[test]
fn file_store_rejects_non_utf8_values() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("credential"), [0xff, 0xfe]).unwrap();
    let store = FileStore::new(dir.path());
    assert!(matches!(store.load(), Err(StoreError::Encoding { key: "credential" })));
}

#[test]
fn file_store_reports_io_failures() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the state directory should be.
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, "x").unwrap();
    let store = FileStore::new(&blocker);
    assert!(matches!(store.save(&credential("tok")), Err(StoreError::Io { key: "credential", .. })));
}

fn staging_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with('.'))
        .collect()
}

#[test]
fn file_store_failed_rename_removes_staging_file() {
    let dir = tempfile::tempdir().unwrap();
    // A non-empty directory where the credential file belongs; rename cannot replace it.
    std::fs::create_dir_all(dir.path().join("credential").join("occupied")).unwrap();
    let store = FileStore::new(dir.path());

    assert!(matches!(store.save(&credential("tok")), Err(StoreError::Io { key: "credential", .. })));
    assert!(staging_files(dir.path()).is_empty());
    // The failed write did not poison later writes to other keys.
    store.save_picture("pic").unwrap();
    assert_eq!(store.load_picture().unwrap().as_deref(), Some("pic"));
}

#[test]
fn file_store_concurrent_writers_use_distinct_staging_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(FileStore::new(dir.path()));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = std::sync::Arc::clone(&store);
            std::thread::spawn(move || store.save_picture(&format!("pic-{i}")))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let stored = store.load_picture().unwrap().unwrap();
    assert!(stored.starts_with("pic-"));
    assert!(staging_files(dir.path()).is_empty());
}
