//! Modes média et plan de services
//!
//! [`MediaMode`] est un ensemble fermé : chaque mode possède un ensemble de
//! services (« owning set ») qui doit tourner tant qu'il est actif. Le
//! [`ServicePlan`] décrit quels services sont gérés (arrêtés lors d'un
//! changement de mode) et à quel mode chacun appartient.

use crate::error::{ModeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Sortie audio/vidéo active
///
/// Les chaînes persistées sont les noms historiques (`partybox`, `spotify`,
/// `airplay`, `bluetooth`, `tv`, `mute`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MediaMode {
    /// Lecteur local PartyBox
    #[serde(rename = "partybox")]
    PrimaryPlayer,
    /// Récepteur Spotify Connect (librespot)
    #[serde(rename = "spotify")]
    StreamingReceiver,
    #[serde(rename = "airplay")]
    AirplayReceiver,
    #[serde(rename = "bluetooth")]
    BluetoothReceiver,
    /// Affichage passif, aucun service audio
    #[serde(rename = "tv")]
    PassiveDisplay,
    /// Silence : tout est arrêté, sortie coupée
    #[serde(rename = "mute")]
    Muted,
}

impl MediaMode {
    /// Tous les modes, dans l'ordre d'affichage
    pub const ALL: [MediaMode; 6] = [
        MediaMode::PrimaryPlayer,
        MediaMode::StreamingReceiver,
        MediaMode::AirplayReceiver,
        MediaMode::BluetoothReceiver,
        MediaMode::PassiveDisplay,
        MediaMode::Muted,
    ];

    /// Nom persisté
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaMode::PrimaryPlayer => "partybox",
            MediaMode::StreamingReceiver => "spotify",
            MediaMode::AirplayReceiver => "airplay",
            MediaMode::BluetoothReceiver => "bluetooth",
            MediaMode::PassiveDisplay => "tv",
            MediaMode::Muted => "mute",
        }
    }

    /// Nom descriptif accepté en entrée
    pub fn alias(&self) -> &'static str {
        match self {
            MediaMode::PrimaryPlayer => "primary-player",
            MediaMode::StreamingReceiver => "streaming-receiver",
            MediaMode::AirplayReceiver => "airplay-receiver",
            MediaMode::BluetoothReceiver => "bluetooth-receiver",
            MediaMode::PassiveDisplay => "passive-display",
            MediaMode::Muted => "muted",
        }
    }
}

impl fmt::Display for MediaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        MediaMode::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted || m.alias() == wanted)
            .ok_or_else(|| ModeError::InvalidMode(s.to_string()))
    }
}

/// Service géré et son mode propriétaire éventuel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedService {
    pub unit: String,
    pub owner: Option<MediaMode>,
}

/// Services gérés et services requis par chaque mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePlan {
    managed: Vec<String>,
    owners: BTreeMap<MediaMode, Vec<String>>,
}

impl ServicePlan {
    /// Construit un plan
    ///
    /// `managed` liste les unités arrêtées lors d'un changement de mode.
    /// Une unité possédée mais non gérée (ex: `bluetooth.service`) est
    /// démarrée pour son mode et jamais arrêtée.
    ///
    /// # Errors
    ///
    /// [`ModeError::PlanConflict`] si une unité appartient à deux modes.
    pub fn new<I>(managed: Vec<String>, owners: I) -> Result<Self>
    where
        I: IntoIterator<Item = (MediaMode, Vec<String>)>,
    {
        let owners: BTreeMap<MediaMode, Vec<String>> = owners.into_iter().collect();

        let mut seen: BTreeMap<&str, MediaMode> = BTreeMap::new();
        for (mode, units) in &owners {
            for unit in units {
                if let Some(first) = seen.insert(unit.as_str(), *mode) {
                    if first != *mode {
                        return Err(ModeError::PlanConflict {
                            unit: unit.clone(),
                            first,
                            second: *mode,
                        });
                    }
                }
            }
        }

        Ok(Self { managed, owners })
    }

    /// Unités gérées, dans l'ordre d'arrêt
    pub fn managed(&self) -> &[String] {
        &self.managed
    }

    /// Unités requises par `mode`, dans l'ordre de démarrage
    pub fn owners(&self, mode: MediaMode) -> &[String] {
        self.owners.get(&mode).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Unités gérées à arrêter pour passer en `target`
    pub fn units_to_stop(&self, target: MediaMode) -> Vec<&str> {
        let keep = self.owners(target);
        self.managed
            .iter()
            .filter(|unit| !keep.contains(unit))
            .map(String::as_str)
            .collect()
    }

    /// Unités surveillées par la vue d'état : gérées et support, triées
    pub fn monitored_units(&self) -> Vec<String> {
        self.managed
            .iter()
            .chain(self.owners.values().flatten())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Vue détaillée des unités gérées
    pub fn services(&self) -> Vec<ManagedService> {
        self.managed
            .iter()
            .map(|unit| ManagedService {
                unit: unit.clone(),
                owner: self
                    .owners
                    .iter()
                    .find(|(_, units)| units.contains(unit))
                    .map(|(mode, _)| *mode),
            })
            .collect()
    }
}

impl Default for ServicePlan {
    fn default() -> Self {
        let units = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            managed: units(&[
                "partybox-player.service",
                "librespot.service",
                "partybox-airplay.service",
                "partybox-bluetooth.service",
            ]),
            owners: BTreeMap::from([
                (MediaMode::PrimaryPlayer, units(&["partybox-player.service"])),
                (MediaMode::StreamingReceiver, units(&["librespot.service"])),
                (MediaMode::AirplayReceiver, units(&["partybox-airplay.service"])),
                (
                    MediaMode::BluetoothReceiver,
                    units(&["bluetooth.service", "partybox-bluetooth.service"]),
                ),
                (MediaMode::PassiveDisplay, Vec::new()),
                (MediaMode::Muted, Vec::new()),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_legacy_names_and_aliases() {
        assert_eq!("spotify".parse::<MediaMode>().unwrap(), MediaMode::StreamingReceiver);
        assert_eq!("  TV ".parse::<MediaMode>().unwrap(), MediaMode::PassiveDisplay);
        assert_eq!("Bluetooth-Receiver".parse::<MediaMode>().unwrap(), MediaMode::BluetoothReceiver);
        assert_eq!("muted".parse::<MediaMode>().unwrap(), MediaMode::Muted);

        let err = "not-a-mode".parse::<MediaMode>().unwrap_err();
        assert_eq!(err.to_string(), "bad mode");
        assert!("".parse::<MediaMode>().is_err());
    }

    #[test]
    fn test_serde_uses_legacy_names() {
        assert_eq!(serde_json::to_string(&MediaMode::Muted).unwrap(), "\"mute\"");
        let m: MediaMode = serde_json::from_str("\"airplay\"").unwrap();
        assert_eq!(m, MediaMode::AirplayReceiver);
        for mode in MediaMode::ALL {
            assert_eq!(mode.to_string(), mode.as_str());
        }
    }

    #[test]
    fn test_default_plan() {
        let plan = ServicePlan::default();
        assert_eq!(
            plan.units_to_stop(MediaMode::StreamingReceiver),
            vec![
                "partybox-player.service",
                "partybox-airplay.service",
                "partybox-bluetooth.service"
            ]
        );
        assert_eq!(plan.units_to_stop(MediaMode::Muted).len(), 4);
        assert!(plan.owners(MediaMode::PassiveDisplay).is_empty());
        assert_eq!(plan.monitored_units().len(), 5);
        assert!(plan.monitored_units().contains(&"bluetooth.service".to_string()));

        let services = plan.services();
        assert_eq!(services.len(), 4);
        assert_eq!(services[1].owner, Some(MediaMode::StreamingReceiver));
    }

    #[test]
    fn test_plan_rejects_double_ownership() {
        let err = ServicePlan::new(
            vec!["a.service".into()],
            [
                (MediaMode::PrimaryPlayer, vec!["a.service".into()]),
                (MediaMode::AirplayReceiver, vec!["a.service".into()]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, ModeError::PlanConflict { .. }));
    }
}
