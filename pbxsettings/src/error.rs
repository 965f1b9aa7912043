//! Types d'erreurs pour les réglages persistants

use thiserror::Error;

/// Erreurs du magasin de réglages
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Erreur SQLite (ouverture, requête, verrou)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Erreur d'entrée/sortie (création du répertoire parent)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Clé invalide (vide)
    #[error("Invalid settings key: {0:?}")]
    InvalidKey(String),
}

/// Type Result spécialisé pour les réglages
pub type Result<T> = std::result::Result<T, SettingsError>;
