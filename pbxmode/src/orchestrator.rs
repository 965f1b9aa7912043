//! Orchestrateur des modes média
//!
//! Un changement de mode arrête les services des autres modes, règle la
//! sortie audio, démarre puis vérifie les services du mode cible. Si le
//! démarrage ou la vérification échoue, l'orchestrateur se replie une fois
//! vers le silence (`mute`).
//!
//! Aucune méthode publique ne retourne d'erreur : les échecs sont décrits
//! dans [`ModeSwitchOutcome`] et persistés dans les réglages.

use crate::actions::{ActionKind, ActionLog, ActionRecord};
use crate::error::{ModeError, Result};
use crate::hook::PauseHook;
use crate::infra::{BluetoothControl, MixerControl, ServiceControl};
use crate::mode::{MediaMode, ServicePlan};
use crate::status::{ModeStatus, STATUS_NOT_INSTALLED, StatusCache, UnitStatus};
use chrono::Utc;
use pbxsettings::SettingsStore;
use pbxutils::CommandRunner;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// Clés des réglages persistés
pub const SETTING_MEDIA_MODE: &str = "media_mode";
pub const SETTING_AV_MODE: &str = "av_mode";
pub const SETTING_TV_PAUSED: &str = "tv_paused";
pub const SETTING_TV_MUTED: &str = "tv_muted";
pub const SETTING_LAST_SWITCH_TS: &str = "media_mode_last_switch_ts";
pub const SETTING_LAST_ERROR: &str = "media_mode_last_error";
pub const SETTING_LAST_ACTIONS: &str = "media_mode_last_actions_json";

/// Nombre d'actions montrées par la vue d'état
const STATUS_ACTIONS: usize = 20;

pub const DEFAULT_DISCOVERABLE_SECS: u32 = 300;
pub const MIN_DISCOVERABLE_SECS: u32 = 30;
pub const MAX_DISCOVERABLE_SECS: u32 = 1800;

/// Paramètres de l'orchestrateur
#[derive(Debug, Clone)]
pub struct ModeOptions {
    pub sudo_bin: String,
    pub systemctl_bin: String,
    pub bluetoothctl_bin: String,
    pub wpctl_bin: String,
    pub pactl_bin: String,
    /// Nom annoncé en Bluetooth
    pub bluetooth_alias: String,
    pub status_cache_ttl: Duration,
    /// Interroger les périphériques Bluetooth même hors du mode bluetooth
    pub always_query_bluetooth: bool,
    pub mute_volume_percent: i64,
    pub systemctl_timeout: Duration,
    pub bluetooth_timeout: Duration,
    pub mixer_timeout: Duration,
    pub plan: ServicePlan,
}

impl Default for ModeOptions {
    fn default() -> Self {
        Self {
            sudo_bin: "sudo".into(),
            systemctl_bin: "systemctl".into(),
            bluetoothctl_bin: "bluetoothctl".into(),
            wpctl_bin: "wpctl".into(),
            pactl_bin: "pactl".into(),
            bluetooth_alias: "PartyBox BT".into(),
            status_cache_ttl: Duration::from_secs(5),
            always_query_bluetooth: false,
            mute_volume_percent: 35,
            systemctl_timeout: Duration::from_secs(12),
            bluetooth_timeout: Duration::from_millis(2500),
            mixer_timeout: Duration::from_secs(5),
            plan: ServicePlan::default(),
        }
    }
}

/// Résultat d'un changement de mode
#[derive(Debug, Clone, Serialize)]
pub struct ModeSwitchOutcome {
    pub ok: bool,
    /// Mode effectif après l'appel
    pub mode: MediaMode,
    /// Vide en cas de succès
    pub error: String,
    pub status: ModeStatus,
}

/// Résultat de [`ModeOrchestrator::make_discoverable`]
#[derive(Debug, Clone, Serialize)]
pub struct DiscoverableOutcome {
    pub ok: bool,
    pub seconds: u32,
    pub error: String,
    pub status: ModeStatus,
}

pub struct ModeOrchestrator {
    settings: Arc<dyn SettingsStore>,
    services: ServiceControl,
    bluetooth: BluetoothControl,
    mixer: MixerControl,
    plan: ServicePlan,
    bluetooth_alias: String,
    mute_volume_percent: i64,
    always_query_bluetooth: bool,
    cache: StatusCache,
    switch_lock: Mutex<()>,
}

impl ModeOrchestrator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        settings: Arc<dyn SettingsStore>,
        options: ModeOptions,
    ) -> Self {
        let ttl = options.status_cache_ttl.max(Duration::from_secs(1));
        Self {
            settings,
            services: ServiceControl::new(
                runner.clone(),
                options.sudo_bin.clone(),
                options.systemctl_bin,
                options.systemctl_timeout,
            ),
            bluetooth: BluetoothControl::new(
                runner.clone(),
                options.sudo_bin,
                options.bluetoothctl_bin,
                options.bluetooth_timeout,
            ),
            mixer: MixerControl::new(
                runner,
                options.wpctl_bin,
                options.pactl_bin,
                options.mixer_timeout,
            ),
            plan: options.plan,
            bluetooth_alias: options.bluetooth_alias,
            mute_volume_percent: options.mute_volume_percent,
            always_query_bluetooth: options.always_query_bluetooth,
            cache: StatusCache::new(ttl),
            switch_lock: Mutex::new(()),
        }
    }

    pub fn plan(&self) -> &ServicePlan {
        &self.plan
    }

    // ============ Réglages ============

    /// Mode persisté ; repli sur `av_mode` pour les anciennes installations
    pub fn current_mode(&self) -> MediaMode {
        let raw = self.settings.get(SETTING_MEDIA_MODE, "");
        if let Ok(mode) = raw.parse() {
            return mode;
        }
        let av = self.settings.get(SETTING_AV_MODE, "partybox");
        if av.trim().eq_ignore_ascii_case("spotify") {
            MediaMode::StreamingReceiver
        } else {
            MediaMode::PrimaryPlayer
        }
    }

    fn write_setting(&self, key: &str, value: &str) -> Result<()> {
        self.settings.set(key, value)?;
        Ok(())
    }

    /// Écrit un réglage ; un échec est journalisé sans interrompre l'appel
    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.write_setting(key, value) {
            warn!(key, error = %e, "Failed to persist setting");
        }
    }

    fn persist_outcome(&self, mode: MediaMode, log: &ActionLog, error: &str) {
        self.persist(SETTING_MEDIA_MODE, mode.as_str());
        self.persist(
            SETTING_AV_MODE,
            if mode == MediaMode::StreamingReceiver {
                "spotify"
            } else {
                "partybox"
            },
        );
        self.persist(
            SETTING_TV_PAUSED,
            if mode == MediaMode::PrimaryPlayer { "0" } else { "1" },
        );
        self.persist(
            SETTING_TV_MUTED,
            if mode == MediaMode::Muted { "1" } else { "0" },
        );
        self.persist(SETTING_LAST_SWITCH_TS, &Utc::now().timestamp().to_string());
        self.persist(SETTING_LAST_ACTIONS, &log.to_bounded_json());
        self.persist(SETTING_LAST_ERROR, error.trim());
    }

    // ============ Vue d'état ============

    /// État courant, servi depuis le cache tant qu'il est frais
    ///
    /// `refresh` force une nouvelle collecte.
    pub async fn get_status(&self, refresh: bool) -> ModeStatus {
        (*self.status_arc(refresh).await).clone()
    }

    async fn status_arc(&self, refresh: bool) -> Arc<ModeStatus> {
        if !refresh {
            if let Some(status) = self.cache.fresh() {
                return status;
            }
        }
        let status = Arc::new(self.collect_status().await);
        self.cache.store(Arc::clone(&status));
        status
    }

    async fn collect_status(&self) -> ModeStatus {
        let mode = self.current_mode();
        let last_switch_ts = self
            .settings
            .get(SETTING_LAST_SWITCH_TS, "0")
            .trim()
            .parse()
            .unwrap_or(0);

        let mut services = BTreeMap::new();
        for unit in self.plan.monitored_units() {
            let state = self.services.is_active(&unit).await;
            let mut status = UnitStatus {
                active: state.active,
                status: state.status,
                load_state: None,
                stderr: state.stderr,
            };
            if !status.active {
                let props = self.services.show(&unit, &["LoadState"]).await;
                if let Some(load) = props.get("LoadState") {
                    if load == "not-found" {
                        status.status = STATUS_NOT_INSTALLED.to_string();
                    }
                    status.load_state = Some(load.clone());
                }
            }
            services.insert(unit, status);
        }

        let bluetooth_connected_devices =
            if mode == MediaMode::BluetoothReceiver || self.always_query_bluetooth {
                self.bluetooth.connected_devices().await
            } else {
                Vec::new()
            };

        ModeStatus {
            mode,
            valid_modes: MediaMode::ALL.to_vec(),
            last_switch_ts,
            last_error: self.settings.get(SETTING_LAST_ERROR, "").trim().to_string(),
            services,
            audio_muted: self.mixer.muted().await,
            bluetooth_connected_devices,
            last_actions: ActionLog::tail_from_json(
                &self.settings.get(SETTING_LAST_ACTIONS, ""),
                STATUS_ACTIONS,
            ),
            noop: false,
            ensured: false,
        }
    }

    // ============ Changement de mode ============

    /// Point d'entrée textuel : un nom de mode inconnu est refusé sans effet
    pub async fn request_mode(
        &self,
        raw: &str,
        pause: Option<&dyn PauseHook>,
        force: bool,
    ) -> ModeSwitchOutcome {
        match raw.parse::<MediaMode>() {
            Ok(target) => self.set_mode(target, pause, force).await,
            Err(e) => {
                warn!(requested = raw, "Rejected unknown media mode");
                ModeSwitchOutcome {
                    ok: false,
                    mode: self.current_mode(),
                    error: e.to_string(),
                    status: self.get_status(false).await,
                }
            }
        }
    }

    /// Passe en mode `target`
    ///
    /// - mode déjà actif, sans `force` : aucun effet (`status.noop`)
    /// - mode déjà actif, avec `force` : redémarre et revérifie les services
    ///   du mode, sans rien arrêter (`status.ensured`)
    /// - sinon : changement complet, avec repli vers `mute` en cas d'échec
    ///
    /// `pause` est appelé au mieux avant de quitter le mode `spotify`.
    pub async fn set_mode(
        &self,
        target: MediaMode,
        pause: Option<&dyn PauseHook>,
        force: bool,
    ) -> ModeSwitchOutcome {
        let _guard = self.switch_lock.lock().await;
        let current = self.current_mode();

        if current == target && !force {
            info!(mode = %target, "Media mode already active, nothing to do");
            self.persist(SETTING_LAST_ERROR, "");
            let mut status = self.noop_status(current);
            status.noop = true;
            return ModeSwitchOutcome {
                ok: true,
                mode: current,
                error: String::new(),
                status,
            };
        }

        let mut log = ActionLog::new();

        if current == target {
            info!(mode = %target, "Ensuring media mode is active");
            let error = match self.ensure_active(target, &mut log).await {
                Ok(()) => String::new(),
                Err(e) => {
                    warn!(mode = %target, error = %e, "Ensure active failed");
                    log.push(ActionRecord::error(ActionKind::EnsureError, e.to_string()));
                    e.to_string()
                }
            };
            let ok = error.is_empty();
            let mut status = self.finish(target, &log, &error).await;
            status.ensured = ok;
            return ModeSwitchOutcome {
                ok,
                mode: target,
                error,
                status,
            };
        }

        info!(from = %current, to = %target, "Switching media mode");
        let (resulting, error) = match self.switch(current, target, pause, &mut log).await {
            Ok(()) => (target, String::new()),
            Err(e) => {
                let mut error = e.to_string();
                warn!(from = %current, to = %target, error = %error, "Media mode switch failed");
                log.push(ActionRecord::error(ActionKind::SwitchError, &error));

                let resulting = if target == MediaMode::Muted {
                    current
                } else {
                    info!("Attempting fallback to mute");
                    match self.fallback_to_mute(target, &mut log).await {
                        Ok(()) => MediaMode::Muted,
                        Err(fallback) => {
                            warn!(error = %fallback, "Fallback to mute failed");
                            log.push(ActionRecord::error(
                                ActionKind::FallbackError,
                                fallback.to_string(),
                            ));
                            error = format!("{error}; fallback_to_mute_failed={fallback}");
                            current
                        }
                    }
                };
                (resulting, error)
            }
        };

        let status = self.finish(resulting, &log, &error).await;
        ModeSwitchOutcome {
            ok: error.is_empty(),
            mode: resulting,
            error,
            status,
        }
    }

    /// Vue d'état d'un appel sans effet, construite sans interroger le système
    ///
    /// Le dernier instantané (même expiré) fournit l'état des services ; à
    /// défaut, seuls les réglages sont lus. Le cache est invalidé pour que la
    /// prochaine lecture ne serve plus l'ancienne erreur.
    fn noop_status(&self, mode: MediaMode) -> ModeStatus {
        let latest = self.cache.latest();
        self.cache.invalidate();

        let mut status = match latest {
            Some(cached) => (*cached).clone(),
            None => ModeStatus {
                mode,
                valid_modes: MediaMode::ALL.to_vec(),
                last_switch_ts: 0,
                last_error: String::new(),
                services: BTreeMap::new(),
                audio_muted: Some(self.settings.get(SETTING_TV_MUTED, "0").trim() == "1"),
                bluetooth_connected_devices: Vec::new(),
                last_actions: Vec::new(),
                noop: false,
                ensured: false,
            },
        };
        status.mode = mode;
        status.last_switch_ts = self
            .settings
            .get(SETTING_LAST_SWITCH_TS, "0")
            .trim()
            .parse()
            .unwrap_or(0);
        status.last_error.clear();
        status.last_actions = ActionLog::tail_from_json(
            &self.settings.get(SETTING_LAST_ACTIONS, ""),
            STATUS_ACTIONS,
        );
        status.ensured = false;
        status
    }

    /// Persiste le résultat et retourne une vue d'état fraîche
    async fn finish(&self, mode: MediaMode, log: &ActionLog, error: &str) -> ModeStatus {
        self.persist_outcome(mode, log, error);
        self.cache.invalidate();
        self.get_status(true).await
    }

    async fn switch(
        &self,
        previous: MediaMode,
        target: MediaMode,
        pause: Option<&dyn PauseHook>,
        log: &mut ActionLog,
    ) -> Result<()> {
        if previous == MediaMode::StreamingReceiver {
            if let Some(hook) = pause {
                let report = hook.pause().await;
                info!(ok = report.ok, detail = %report.detail, "Streaming pause attempt");
                log.push(ActionRecord::pause(&report));
            }
        }

        self.stop_others(target, log).await;
        if previous == MediaMode::BluetoothReceiver {
            self.bluetooth_teardown(log).await;
        }
        self.apply_routing(target, log).await;

        self.start_owners(target, log).await?;
        if target == MediaMode::BluetoothReceiver {
            self.bluetooth_announce(log).await;
        }
        self.verify_owners(target, log).await
    }

    async fn ensure_active(&self, target: MediaMode, log: &mut ActionLog) -> Result<()> {
        self.apply_routing(target, log).await;
        self.start_owners(target, log).await?;
        if target == MediaMode::BluetoothReceiver {
            self.bluetooth_announce(log).await;
        }
        self.verify_owners(target, log).await
    }

    /// Repli vers le silence après l'échec d'un passage en `failed_target`
    ///
    /// Réussi si chaque arrêt (toléré compris) et la coupure du son réussissent.
    async fn fallback_to_mute(&self, failed_target: MediaMode, log: &mut ActionLog) -> Result<()> {
        let mut failures = self.stop_others(MediaMode::Muted, log).await;
        if failed_target == MediaMode::BluetoothReceiver {
            self.bluetooth_teardown(log).await;
        }
        if !self.apply_routing(MediaMode::Muted, log).await {
            failures.push("sink mute failed".to_string());
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ModeError::FallbackIncomplete(failures.join(", ")))
        }
    }

    // ============ Étapes ============

    /// Arrête les services gérés hors du mode cible ; retourne les échecs
    async fn stop_others(&self, target: MediaMode, log: &mut ActionLog) -> Vec<String> {
        let mut failures = Vec::new();
        for unit in self.plan.units_to_stop(target) {
            let call = self.services.stop(unit).await;
            let mut record = ActionRecord::from_output(ActionKind::ServiceStop, unit, &call.output);
            record.ignored = call.ignored;
            if !call.output.ok {
                warn!(unit, stderr = %call.output.stderr, "Failed to stop service");
                failures.push(format!("stop {unit}: {}", call.output.detail()));
            }
            log.push(record);
        }
        failures
    }

    async fn bluetooth_teardown(&self, log: &mut ActionLog) {
        for args in [["pairable", "off"], ["discoverable", "off"]] {
            self.bluetooth_step(&args, log).await;
        }
    }

    async fn bluetooth_announce(&self, log: &mut ActionLog) {
        for args in [
            ["power", "on"],
            ["pairable", "on"],
            ["discoverable", "on"],
            ["system-alias", self.bluetooth_alias.as_str()],
        ] {
            self.bluetooth_step(&args, log).await;
        }
    }

    async fn bluetooth_step(&self, args: &[&str], log: &mut ActionLog) {
        let out = self.bluetooth.run(args).await;
        if !out.ok {
            debug!(command = %out.command, stderr = %out.stderr, "bluetoothctl step failed");
        }
        log.push(ActionRecord::from_output(ActionKind::Bluetooth, args.join(" "), &out));
    }

    /// Règle la sortie audio ; retourne le succès de la (dé)coupure
    async fn apply_routing(&self, target: MediaMode, log: &mut ActionLog) -> bool {
        let mute = target == MediaMode::Muted;
        let out = self.mixer.set_mute(mute).await;
        let muted_ok = out.ok;
        log.push(ActionRecord::from_output(
            ActionKind::SinkMute,
            if mute { "mute" } else { "unmute" },
            &out,
        ));
        if mute {
            let out = self.mixer.set_volume(self.mute_volume_percent).await;
            log.push(ActionRecord::from_output(
                ActionKind::SinkVolume,
                format!("{}%", self.mute_volume_percent.clamp(0, 150)),
                &out,
            ));
        }
        muted_ok
    }

    async fn start_owners(&self, target: MediaMode, log: &mut ActionLog) -> Result<()> {
        for unit in self.plan.owners(target) {
            let out = self.services.start(unit).await;
            log.push(ActionRecord::from_output(ActionKind::ServiceStart, unit, &out));
            if !out.ok {
                return Err(ModeError::start_failed(unit, out.detail()));
            }
        }
        Ok(())
    }

    async fn verify_owners(&self, target: MediaMode, log: &mut ActionLog) -> Result<()> {
        for unit in self.plan.owners(target) {
            let state = self.services.is_active(unit).await;
            log.push(ActionRecord {
                target: unit.clone(),
                ok: state.active,
                stdout: state.status.clone(),
                stderr: state.stderr.clone(),
                ..ActionRecord::error(ActionKind::ServiceVerify, "")
            });
            if !state.active {
                return Err(ModeError::not_active(unit, &state.status));
            }
        }
        Ok(())
    }

    // ============ Bluetooth ============

    /// Rend l'appareil visible en Bluetooth pendant `seconds`
    ///
    /// `0` vaut 300 s ; les autres valeurs sont bornées à 30–1800 s. Le mode
    /// persisté n'est pas modifié.
    pub async fn make_discoverable(&self, seconds: u32) -> DiscoverableOutcome {
        let _guard = self.switch_lock.lock().await;
        let seconds = if seconds == 0 {
            DEFAULT_DISCOVERABLE_SECS
        } else {
            seconds.clamp(MIN_DISCOVERABLE_SECS, MAX_DISCOVERABLE_SECS)
        };
        info!(seconds, "Making Bluetooth discoverable");

        let mut log = ActionLog::new();
        if let Err(e) = self.start_owners(MediaMode::BluetoothReceiver, &mut log).await {
            let error = e.to_string();
            warn!(error = %error, "Bluetooth services failed to start");
            self.persist(SETTING_LAST_ERROR, &error);
            self.persist(SETTING_LAST_ACTIONS, &log.to_bounded_json());
            self.cache.invalidate();
            return DiscoverableOutcome {
                ok: false,
                seconds,
                error,
                status: self.get_status(true).await,
            };
        }

        let timeout = seconds.to_string();
        for args in [
            ["power", "on"],
            ["pairable", "on"],
            ["discoverable-timeout", timeout.as_str()],
            ["discoverable", "on"],
            ["system-alias", self.bluetooth_alias.as_str()],
        ] {
            self.bluetooth_step(&args, &mut log).await;
        }

        self.persist(SETTING_LAST_ACTIONS, &log.to_bounded_json());
        self.cache.invalidate();
        DiscoverableOutcome {
            ok: true,
            seconds,
            error: String::new(),
            status: self.get_status(true).await,
        }
    }
}
