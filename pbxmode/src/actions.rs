//! Journal d'actions d'un changement de mode
//!
//! Chaque tentative produit une liste ordonnée d'[`ActionRecord`], persistée
//! en JSON sous une taille maximale : les plus anciennes entrées sont
//! retirées en premier pour que la valeur stockée reste du JSON valide.

use crate::hook::PauseReport;
use pbxutils::CommandOutput;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Taille maximale du journal persisté, en octets
pub const MAX_ACTIONS_JSON_BYTES: usize = 20_000;

/// Taille maximale d'une sortie conservée quand une seule entrée dépasse
const MAX_OUTPUT_CHARS: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PauseAttempt,
    ServiceStop,
    ServiceStart,
    ServiceVerify,
    Bluetooth,
    SinkMute,
    SinkVolume,
    SwitchError,
    EnsureError,
    FallbackError,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Une action exécutée (ou tentée) pendant un changement de mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: ActionKind,
    /// Unité systemd, arguments bluetoothctl, ou vide
    #[serde(default)]
    pub target: String,
    pub ok: bool,
    /// Échec toléré (service non installé)
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignored: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ActionRecord {
    pub fn from_output(action: ActionKind, target: impl Into<String>, out: &CommandOutput) -> Self {
        Self {
            action,
            target: target.into(),
            ok: out.ok,
            ignored: false,
            command: out.command.clone(),
            stdout: out.stdout.clone(),
            stderr: out.stderr.clone(),
            elapsed_ms: out.elapsed_ms,
            error: String::new(),
        }
    }

    pub fn error(action: ActionKind, message: impl Into<String>) -> Self {
        Self {
            action,
            target: String::new(),
            ok: false,
            ignored: false,
            command: String::new(),
            stdout: String::new(),
            stderr: String::new(),
            elapsed_ms: 0,
            error: message.into(),
        }
    }

    pub fn pause(report: &PauseReport) -> Self {
        Self {
            ok: report.ok,
            stdout: report.detail.clone(),
            ..Self::error(ActionKind::PauseAttempt, "")
        }
    }

    fn truncated(mut self) -> Self {
        for field in [&mut self.stdout, &mut self.stderr, &mut self.error] {
            if field.chars().count() > MAX_OUTPUT_CHARS {
                *field = field.chars().take(MAX_OUTPUT_CHARS).collect();
            }
        }
        self
    }
}

/// Liste d'actions d'une tentative
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionLog {
    records: Vec<ActionRecord>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ActionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sérialise en JSON d'au plus [`MAX_ACTIONS_JSON_BYTES`] octets
    pub fn to_bounded_json(&self) -> String {
        Self::bounded_json(&self.records, MAX_ACTIONS_JSON_BYTES)
    }

    fn bounded_json(records: &[ActionRecord], max_bytes: usize) -> String {
        let mut start = 0;
        while start < records.len() {
            match serde_json::to_string(&records[start..]) {
                Ok(json) if json.len() <= max_bytes => return json,
                Ok(_) => start += 1,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize action log");
                    return "[]".to_string();
                }
            }
        }

        // Même la dernière entrée seule dépasse : on tronque ses sorties
        if let Some(last) = records.last() {
            if let Ok(json) = serde_json::to_string(&[last.clone().truncated()]) {
                if json.len() <= max_bytes {
                    return json;
                }
            }
        }
        "[]".to_string()
    }

    /// Relit un journal persisté et retourne ses `n` dernières entrées
    ///
    /// Une valeur illisible donne une liste vide.
    pub fn tail_from_json(raw: &str, n: usize) -> Vec<ActionRecord> {
        if raw.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Vec<ActionRecord>>(raw) {
            Ok(mut records) => {
                let skip = records.len().saturating_sub(n);
                records.drain(..skip);
                records
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable action log");
                Vec::new()
            }
        }
    }
}
