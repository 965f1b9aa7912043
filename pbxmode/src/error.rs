//! Types d'erreurs de l'orchestrateur de modes

use crate::mode::MediaMode;
use pbxsettings::SettingsError;
use thiserror::Error;

/// Erreurs internes de l'orchestrateur
///
/// Elles ne traversent jamais l'API publique de [`crate::ModeOrchestrator`] :
/// elles sont converties en message dans [`crate::ModeSwitchOutcome`].
#[derive(Error, Debug)]
pub enum ModeError {
    /// Nom de mode inconnu
    #[error("bad mode")]
    InvalidMode(String),

    /// Échec du démarrage d'un service du mode cible
    #[error("failed to start {unit}: {detail}")]
    StartFailed { unit: String, detail: String },

    /// Service démarré mais pas actif à la vérification
    #[error("{unit} is not active after start ({status})")]
    NotActive { unit: String, status: String },

    /// Une unité appartient à deux modes dans le plan de services
    #[error("{unit} is owned by both {first} and {second}")]
    PlanConflict {
        unit: String,
        first: MediaMode,
        second: MediaMode,
    },

    /// Le repli vers le silence n'a pas abouti entièrement
    #[error("{0}")]
    FallbackIncomplete(String),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

impl ModeError {
    pub fn start_failed(unit: &str, detail: &str) -> Self {
        ModeError::StartFailed {
            unit: unit.to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn not_active(unit: &str, status: &str) -> Self {
        ModeError::NotActive {
            unit: unit.to_string(),
            status: status.to_string(),
        }
    }
}

/// Type Result spécialisé pour l'orchestrateur
pub type Result<T> = std::result::Result<T, ModeError>;
