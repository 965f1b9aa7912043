//! Extension pour lire la configuration des modes depuis pbxconfig
//!
//! Section `media_mode` de `config.yaml` :
//!
//! ```yaml
//! media_mode:
//!   bluetooth_alias: PartyBox BT
//!   status_cache_ttl_secs: 5
//!   mute_volume_percent: 35
//!   services:
//!     managed: [partybox-player.service, librespot.service]
//!     owners:
//!       partybox: [partybox-player.service]
//!       spotify: [librespot.service]
//! ```

use crate::mode::{MediaMode, ServicePlan};
use crate::orchestrator::ModeOptions;
use anyhow::{Context, Result};
use pbxconfig::Config;
use std::time::Duration;

const SECTION: &str = "media_mode";

/// Trait d'extension de `pbxconfig::Config` pour l'orchestrateur de modes
pub trait ModeConfigExt {
    /// Options de l'orchestrateur ; les valeurs absentes prennent leur défaut
    ///
    /// # Errors
    ///
    /// Nom de mode inconnu sous `services.owners`, ou unité possédée par
    /// deux modes.
    fn get_mode_options(&self) -> Result<ModeOptions>;

    /// Plan de services configuré (`media_mode.services`)
    fn get_service_plan(&self) -> Result<ServicePlan>;
}

impl ModeConfigExt for Config {
    fn get_mode_options(&self) -> Result<ModeOptions> {
        let d = ModeOptions::default();
        let s = |key: &str, default: &str| self.get_string(&[SECTION, key], default);
        let secs = |key: &str, default: Duration| {
            Duration::from_secs(self.get_u64(&[SECTION, key], default.as_secs()))
        };

        Ok(ModeOptions {
            sudo_bin: s("sudo_bin", &d.sudo_bin),
            systemctl_bin: s("systemctl_bin", &d.systemctl_bin),
            bluetoothctl_bin: s("bluetoothctl_bin", &d.bluetoothctl_bin),
            wpctl_bin: s("wpctl_bin", &d.wpctl_bin),
            pactl_bin: s("pactl_bin", &d.pactl_bin),
            bluetooth_alias: s("bluetooth_alias", &d.bluetooth_alias),
            status_cache_ttl: secs("status_cache_ttl_secs", d.status_cache_ttl),
            always_query_bluetooth: self
                .get_bool(&[SECTION, "always_query_bluetooth"], d.always_query_bluetooth),
            mute_volume_percent: self
                .get_u64(&[SECTION, "mute_volume_percent"], d.mute_volume_percent as u64)
                .min(150) as i64,
            systemctl_timeout: secs("systemctl_timeout_secs", d.systemctl_timeout),
            bluetooth_timeout: Duration::from_millis(self.get_u64(
                &[SECTION, "bluetooth_timeout_ms"],
                d.bluetooth_timeout.as_millis() as u64,
            )),
            mixer_timeout: secs("mixer_timeout_secs", d.mixer_timeout),
            plan: self.get_service_plan()?,
        })
    }

    fn get_service_plan(&self) -> Result<ServicePlan> {
        let default = ServicePlan::default();
        let managed = self
            .get_string_list(&[SECTION, "services", "managed"])
            .unwrap_or_else(|| default.managed().to_vec());

        let declared = self.get_keys(&[SECTION, "services", "owners"]);
        let owners = if declared.is_empty() {
            MediaMode::ALL
                .into_iter()
                .map(|m| (m, default.owners(m).to_vec()))
                .collect::<Vec<_>>()
        } else {
            let mut owners = Vec::new();
            for key in declared {
                let mode: MediaMode = key
                    .parse()
                    .with_context(|| format!("unknown media mode {key:?} in {SECTION}.services.owners"))?;
                let units = self
                    .get_string_list(&[SECTION, "services", "owners", key.as_str()])
                    .unwrap_or_default();
                owners.push((mode, units));
            }
            owners
        };

        ServicePlan::new(managed, owners).context("invalid media_mode.services")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_embedded_config() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        let options = config.get_mode_options().unwrap();

        assert_eq!(options.bluetooth_alias, "PartyBox BT");
        assert_eq!(options.mute_volume_percent, 35);
        assert_eq!(options.bluetooth_timeout, Duration::from_millis(2500));
        assert_eq!(options.plan, ServicePlan::default());
    }

    #[test]
    fn test_custom_plan() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "media_mode:\n  services:\n    managed: [mpd.service]\n    owners:\n      partybox: [mpd.service]\n",
        )
        .unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        let plan = config.get_service_plan().unwrap();
        assert_eq!(plan.managed(), ["mpd.service".to_string()]);
        assert_eq!(plan.owners(MediaMode::PrimaryPlayer), ["mpd.service".to_string()]);
    }

    #[test]
    fn test_unknown_owner_mode_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        config
            .set_value(
                &[SECTION, "services", "owners", "karaoke"],
                serde_yaml::from_str("[k.service]").unwrap(),
            )
            .unwrap();
        assert!(config.get_service_plan().is_err());
    }
}
