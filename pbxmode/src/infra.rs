//! Accès au système : systemd, bluetoothctl et mixeur audio
//!
//! Toutes les commandes passent par le [`CommandRunner`] injecté et ne
//! produisent jamais d'erreur : seul le résultat [`CommandOutput`] est
//! interprété.

use pbxutils::{CommandOutput, CommandRunner};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Messages systemd signalant une unité absente (composant non installé)
///
/// `not found` seul ne suffit pas : `sudo: systemctl: command not found`
/// signale un outil manquant, pas une unité absente.
const MISSING_UNIT_MARKERS: [&str; 2] = ["not loaded", "could not be found"];

const CONNECTED_DEVICES_TIMEOUT: Duration = Duration::from_millis(1500);

// ============ systemd ============

/// Résultat d'un `systemctl stop`, avec tolérance des unités absentes
#[derive(Debug, Clone)]
pub struct ServiceCall {
    pub output: CommandOutput,
    /// Échec toléré : `output.ok` a été forcé à `true`
    pub ignored: bool,
}

/// État d'une unité selon `systemctl is-active`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitState {
    pub active: bool,
    /// `active`, `inactive`, `failed`, ... ou `unknown` / `error`
    pub status: String,
    pub stderr: String,
}

/// Pilotage des unités systemd via `sudo -n systemctl`
#[derive(Clone)]
pub struct ServiceControl {
    runner: Arc<dyn CommandRunner>,
    sudo: String,
    systemctl: String,
    timeout: Duration,
}

impl ServiceControl {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        sudo: impl Into<String>,
        systemctl: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            sudo: sudo.into(),
            systemctl: systemctl.into(),
            timeout,
        }
    }

    async fn systemctl(&self, args: &[&str]) -> CommandOutput {
        let mut full = vec!["-n", self.systemctl.as_str()];
        full.extend_from_slice(args);
        self.runner.run(&self.sudo, &full, self.timeout).await
    }

    /// Démarre une unité ; aucun échec n'est toléré
    pub async fn start(&self, unit: &str) -> CommandOutput {
        let out = self.systemctl(&["start", unit]).await;
        debug!(unit, ok = out.ok, "systemctl start");
        out
    }

    /// Arrête une unité ; une unité absente compte comme un succès ignoré
    pub async fn stop(&self, unit: &str) -> ServiceCall {
        let mut output = self.systemctl(&["stop", unit]).await;
        let mut ignored = false;
        if !output.ok && is_missing_unit(&output.stderr) {
            info!(unit, "Unit not installed, stop ignored");
            output.ok = true;
            ignored = true;
        }
        debug!(unit, ok = output.ok, ignored, "systemctl stop");
        ServiceCall { output, ignored }
    }

    /// `systemctl is-active` ; un code non nul n'est pas une erreur
    pub async fn is_active(&self, unit: &str) -> UnitState {
        let out = self.systemctl(&["is-active", unit]).await;
        let status = out.stdout.trim().to_lowercase();
        let status = if !status.is_empty() {
            status
        } else if out.ok || is_missing_unit(&out.stderr) {
            "unknown".to_string()
        } else {
            "error".to_string()
        };
        UnitState {
            active: status == "active",
            status,
            stderr: out.stderr,
        }
    }

    /// `systemctl show --property=...` ; les lignes `Clé=Valeur` sont retournées
    pub async fn show(&self, unit: &str, properties: &[&str]) -> HashMap<String, String> {
        let props = format!("--property={}", properties.join(","));
        let out = self.systemctl(&["show", unit, &props]).await;
        if !out.ok {
            return HashMap::new();
        }
        parse_properties(&out.stdout)
    }
}

fn is_missing_unit(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    if MISSING_UNIT_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    // "Unit foo.service not found."
    lower.lines().any(|line| {
        line.find("unit ")
            .and_then(|at| line[at..].find(" not found").map(|end| end > "unit ".len()))
            .unwrap_or(false)
    })
}

fn parse_properties(stdout: &str) -> HashMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

// ============ Bluetooth ============

/// Commandes `bluetoothctl` non interactives
#[derive(Clone)]
pub struct BluetoothControl {
    runner: Arc<dyn CommandRunner>,
    sudo: String,
    bluetoothctl: String,
    timeout: Duration,
}

impl BluetoothControl {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        sudo: impl Into<String>,
        bluetoothctl: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            sudo: sudo.into(),
            bluetoothctl: bluetoothctl.into(),
            timeout,
        }
    }

    async fn run_with_timeout(&self, args: &[&str], timeout: Duration) -> CommandOutput {
        let mut full = vec!["-n", self.bluetoothctl.as_str()];
        full.extend(args.iter().copied().filter(|a| !a.is_empty()));
        self.runner.run(&self.sudo, &full, timeout).await
    }

    /// Commande unique (ex: `["pairable", "off"]`)
    pub async fn run(&self, args: &[&str]) -> CommandOutput {
        self.run_with_timeout(args, self.timeout).await
    }

    /// Noms des périphériques connectés (`devices Connected`)
    pub async fn connected_devices(&self) -> Vec<String> {
        let out = self
            .run_with_timeout(&["devices", "Connected"], CONNECTED_DEVICES_TIMEOUT)
            .await;
        if !out.ok {
            return Vec::new();
        }
        parse_connected_devices(&out.stdout)
    }
}

fn parse_connected_devices(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Device "))
        .filter_map(|rest| rest.split_once(' '))
        .map(|(_addr, name)| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

// ============ Mixeur ============

/// Sortie audio par défaut : `wpctl` (PipeWire) puis `pactl` en repli
#[derive(Clone)]
pub struct MixerControl {
    runner: Arc<dyn CommandRunner>,
    wpctl: String,
    pactl: String,
    timeout: Duration,
}

impl MixerControl {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        wpctl: impl Into<String>,
        pactl: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            wpctl: wpctl.into(),
            pactl: pactl.into(),
            timeout,
        }
    }

    async fn wpctl_then_pactl(&self, wp_args: &[&str], pa_args: &[&str]) -> CommandOutput {
        let out = self.runner.run(&self.wpctl, wp_args, self.timeout).await;
        if out.ok {
            return out;
        }
        debug!(command = %out.command, "wpctl failed, trying pactl");
        self.runner.run(&self.pactl, pa_args, self.timeout).await
    }

    pub async fn set_mute(&self, mute: bool) -> CommandOutput {
        let desired = if mute { "1" } else { "0" };
        self.wpctl_then_pactl(
            &["set-mute", "@DEFAULT_AUDIO_SINK@", desired],
            &["set-sink-mute", "@DEFAULT_SINK@", desired],
        )
        .await
    }

    /// Volume en pourcentage, borné à 0–150
    pub async fn set_volume(&self, percent: i64) -> CommandOutput {
        let pct = format!("{}%", percent.clamp(0, 150));
        self.wpctl_then_pactl(
            &["set-volume", "@DEFAULT_AUDIO_SINK@", &pct],
            &["set-sink-volume", "@DEFAULT_SINK@", &pct],
        )
        .await
    }

    /// État de coupure de la sortie, `None` si indéterminable
    pub async fn muted(&self) -> Option<bool> {
        let out = self
            .runner
            .run(&self.wpctl, &["get-volume", "@DEFAULT_AUDIO_SINK@"], self.timeout)
            .await;
        if out.ok && !out.stdout.is_empty() {
            return Some(out.stdout.contains("[MUTED]"));
        }
        let out = self
            .runner
            .run(&self.pactl, &["get-sink-mute", "@DEFAULT_SINK@"], self.timeout)
            .await;
        if out.ok && !out.stdout.is_empty() {
            return Some(out.stdout.to_lowercase().contains("yes"));
        }
        None
    }
}
