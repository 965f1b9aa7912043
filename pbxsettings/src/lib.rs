//! # pbxsettings - Réglages persistants de PartyBox
//!
//! Magasin clé/valeur minimal partagé par l'orchestrateur de modes et le
//! client Spotify. Il est toujours injecté (`Arc<dyn SettingsStore>`) :
//!
//! - [`SqliteSettings`] : stockage réel dans une base SQLite (WAL)
//! - [`MemorySettings`] : stockage en mémoire (tests, mode `--dry-run`)
//!
//! ```
//! use pbxsettings::{MemorySettings, SettingsStore};
//!
//! let store = MemorySettings::new();
//! store.set("media_mode", "spotify").unwrap();
//! assert_eq!(store.get("media_mode", "partybox"), "spotify");
//! assert_eq!(store.get("tv_paused", "0"), "0");
//! ```

pub mod db;
pub mod error;
pub mod memory;

pub use db::SqliteSettings;
pub use error::{Result, SettingsError};
pub use memory::MemorySettings;

/// Magasin de réglages clé/valeur
///
/// La lecture ne peut pas échouer : une clé absente ou illisible retourne
/// `default`. L'écriture remonte ses erreurs ; les appelants décident de
/// les journaliser ou non.
pub trait SettingsStore: Send + Sync {
    /// Valeur de `key`, ou `default` si absente
    fn get(&self, key: &str, default: &str) -> String;

    /// Écrit `value` pour `key` (insertion ou remplacement)
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Toutes les paires (clé, valeur), triées par clé
    fn entries(&self) -> Vec<(String, String)>;
}

pub(crate) fn check_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(SettingsError::InvalidKey(key.to_string()));
    }
    Ok(())
}
