//! Point d'extension appelé avant de quitter le récepteur Spotify

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Résultat d'une tentative de pause
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseReport {
    pub ok: bool,
    pub detail: String,
}

impl PauseReport {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: detail.into(),
        }
    }
}

/// Met en pause la lecture en cours sur le fournisseur de streaming.
///
/// Appelé au mieux : un échec est consigné dans le journal d'actions mais
/// n'interrompt jamais le changement de mode.
#[async_trait]
pub trait PauseHook: Send + Sync {
    async fn pause(&self) -> PauseReport;
}
