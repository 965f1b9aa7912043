//! Stockage SQLite des réglages
//!
//! Une seule table `settings(key PRIMARY KEY, value, updated_at)`. La
//! connexion est protégée par un `Mutex` ; le journal WAL permet aux autres
//! processus PartyBox (lecteur, interface web) de lire pendant une écriture.

use crate::{Result, SettingsStore, check_key};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Réglages persistés dans une base SQLite
#[derive(Debug)]
pub struct SqliteSettings {
    conn: Mutex<Connection>,
}

impl SqliteSettings {
    /// Ouvre (ou crée) la base à `path`
    ///
    /// # Exemple
    ///
    /// ```rust,no_run
    /// use pbxsettings::{SettingsStore, SqliteSettings};
    /// use std::path::Path;
    ///
    /// let store = SqliteSettings::open(Path::new("partybox.db")).unwrap();
    /// println!("{}", store.get("media_mode", "partybox"));
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        // journal_mode retourne une ligne : pragma_update ne convient pas
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "Opened settings database");
        Self::init(conn)
    }

    /// Base en mémoire
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lecture stricte : `None` si la clé est absente
    pub fn try_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Supprime une clé; retourne `true` si elle existait
    pub fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let n = conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }

    fn try_entries(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

impl SettingsStore for SqliteSettings {
    fn get(&self, key: &str, default: &str) -> String {
        match self.try_get(key) {
            Ok(Some(value)) => value,
            Ok(None) => default.to_string(),
            Err(e) => {
                warn!(key, error = %e, "Failed to read setting, using default");
                default.to_string()
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        check_key(key)?;
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn entries(&self) -> Vec<(String, String)> {
        self.try_entries().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list settings");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_roundtrip() {
        let store = SqliteSettings::open_in_memory().unwrap();
        assert_eq!(store.get("media_mode", "partybox"), "partybox");
        assert_eq!(store.try_get("media_mode").unwrap(), None);

        store.set("media_mode", "airplay").unwrap();
        store.set("media_mode", "bluetooth").unwrap();
        assert_eq!(store.get("media_mode", "partybox"), "bluetooth");

        assert!(store.remove("media_mode").unwrap());
        assert!(!store.remove("media_mode").unwrap());
        assert_eq!(store.get("media_mode", "x"), "x");
    }

    #[test]
    fn test_entries_sorted() {
        let store = SqliteSettings::open_in_memory().unwrap();
        store.set("tv_paused", "1").unwrap();
        store.set("av_mode", "partybox").unwrap();
        let keys: Vec<_> = store.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["av_mode", "tv_paused"]);
    }
}
