//! Vue d'état de l'orchestrateur et son cache à courte durée de vie

use crate::actions::ActionRecord;
use crate::mode::MediaMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Statut `not-installed` : l'unité n'existe pas sur la machine
pub const STATUS_NOT_INSTALLED: &str = "not-installed";

/// État d'une unité systemd dans la vue d'état
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub active: bool,
    pub status: String,
    /// `LoadState` systemd, renseigné pour les unités inactives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_state: Option<String>,
    #[serde(default)]
    pub stderr: String,
}

/// Instantané de l'état des modes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeStatus {
    pub mode: MediaMode,
    pub valid_modes: Vec<MediaMode>,
    pub last_switch_ts: i64,
    pub last_error: String,
    pub services: BTreeMap<String, UnitStatus>,
    pub audio_muted: Option<bool>,
    pub bluetooth_connected_devices: Vec<String>,
    pub last_actions: Vec<ActionRecord>,
    /// Le dernier appel était sans effet (mode déjà actif)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub noop: bool,
    /// Le dernier appel a revérifié le mode courant (`force`)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ensured: bool,
}

/// Cache de la vue d'état, remplacé en bloc
#[derive(Debug)]
pub struct StatusCache {
    ttl: Duration,
    entry: Mutex<Option<(Instant, Arc<ModeStatus>)>>,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self) -> MutexGuard<'_, Option<(Instant, Arc<ModeStatus>)>> {
        self.entry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Instantané encore frais, s'il existe
    pub fn fresh(&self) -> Option<Arc<ModeStatus>> {
        match self.slot().as_ref() {
            Some((at, status)) if at.elapsed() < self.ttl => Some(Arc::clone(status)),
            _ => None,
        }
    }

    /// Dernier instantané connu, même expiré
    pub fn latest(&self) -> Option<Arc<ModeStatus>> {
        self.slot().as_ref().map(|(_, status)| Arc::clone(status))
    }

    pub fn store(&self, status: Arc<ModeStatus>) {
        *self.slot() = Some((Instant::now(), status));
    }

    pub fn invalidate(&self) {
        *self.slot() = None;
    }
}
