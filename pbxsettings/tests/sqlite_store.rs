//! Tests d'intégration du stockage SQLite sur fichier

use pbxsettings::{MemorySettings, SettingsStore, SqliteSettings};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

#[test]
fn test_values_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("partybox.db");

    {
        let store = SqliteSettings::open(&path).unwrap();
        store.set("media_mode", "spotify").unwrap();
        store.set("media_mode_last_error", "").unwrap();
    }

    let store = SqliteSettings::open(&path).unwrap();
    assert_eq!(store.get("media_mode", "partybox"), "spotify");
    // Une valeur vide est une valeur, pas une absence
    assert_eq!(store.get("media_mode_last_error", "x"), "");
}

#[test]
fn test_concurrent_writers() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteSettings::open(&dir.path().join("pbx.db")).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store.set(&format!("key_{i}"), &i.to_string()).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.entries().len(), 8);
    assert_eq!(store.get("key_7", ""), "7");
}

#[test]
fn test_memory_seeded_from_sqlite() {
    let dir = TempDir::new().unwrap();
    let store = SqliteSettings::open(&dir.path().join("pbx.db")).unwrap();
    store.set("media_mode", "tv").unwrap();

    let copy = MemorySettings::seeded(store.entries());
    copy.set("media_mode", "mute").unwrap();

    assert_eq!(copy.get("media_mode", ""), "mute");
    assert_eq!(store.get("media_mode", ""), "tv");
}
