//! Client Spotify de haut niveau : token, cache, cooldown et affinité d'appareil

use crate::api::{ApiReply, DEFAULT_API_BASE, DEFAULT_TOKEN_URL, SpotifyApi};
use crate::cache::PlaybackCache;
use crate::error::{Result, SpotifyError};
use crate::models::{
    AccountInfo, CoverImages, DeviceInfo, MePayload, PlaybackSnapshot, PlaybackState,
    PlayerPayload, TrackInfo,
};
use pbxmode::PauseReport;
use pbxsettings::SettingsStore;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Réglage contenant le refresh token renvoyé par le fournisseur
pub const SETTING_REFRESH_TOKEN: &str = "spotify_refresh_token";

const PLAYER_PATH: &str = "/me/player";
const CURRENTLY_PLAYING_PATH: &str = "/me/player/currently-playing";
const PAUSE_PATH: &str = "/me/player/pause";
const ME_PATH: &str = "/me";

/// Durée de cache du nom de compte
const ACCOUNT_TTL: Duration = Duration::from_secs(300);

/// Bornes du cooldown après un 429
const MIN_RATE_LIMIT_SECS: u64 = 5;

/// Marge retirée à la durée de vie annoncée du token
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 30;

/// Options du client Spotify
#[derive(Debug, Clone)]
pub struct SpotifyOptions {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// Nom de l'appareil Spotify Connect de PartyBox
    pub device_name: String,
    /// Identifiant exact de l'appareil ; prioritaire sur le nom
    pub device_id: String,
    pub cache_ttl: Duration,
    pub timeout: Duration,
    /// Cooldown appliqué quand `Retry-After` est absent
    pub rate_limit_backoff: Duration,
    pub rate_limit_max_backoff: Duration,
    pub api_base: String,
    pub token_url: String,
}

impl Default for SpotifyOptions {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            device_name: "PartyBox".to_string(),
            device_id: String::new(),
            cache_ttl: Duration::from_secs(15),
            timeout: Duration::from_secs(2),
            rate_limit_backoff: Duration::from_secs(30),
            rate_limit_max_backoff: Duration::from_secs(300),
            api_base: DEFAULT_API_BASE.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Issue d'un appel à l'API après gestion du 401 et du 429
enum CallOutcome {
    Reply(ApiReply),
    /// Cooldown actif ou déclenché par cet appel
    RateLimited(String),
    /// Erreur de transport ou d'authentification
    Failed(String),
}

/// Builder du [`SpotifyClient`]
pub struct SpotifyClientBuilder {
    options: SpotifyOptions,
    settings: Option<Arc<dyn SettingsStore>>,
}

impl SpotifyClientBuilder {
    pub fn new(options: SpotifyOptions) -> Self {
        Self {
            options,
            settings: None,
        }
    }

    /// URL de base de l'API Web (serveur de test)
    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.options.api_base = url.into();
        self
    }

    /// URL du point d'accès `token` (serveur de test)
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.options.token_url = url.into();
        self
    }

    /// Magasin où persister un refresh token renouvelé
    pub fn settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn build(self) -> Result<SpotifyClient> {
        SpotifyClient::new(self.options, self.settings)
    }
}

/// Client résilient de l'état de lecture Spotify
///
/// [`get_state`](Self::get_state) ne retourne jamais d'erreur : les échecs
/// deviennent des instantanés `error`, `cooldown` ou `inactive`, servis si
/// possible à partir du dernier état connu.
pub struct SpotifyClient {
    options: SpotifyOptions,
    api: SpotifyApi,
    settings: Option<Arc<dyn SettingsStore>>,
    refresh_token: Mutex<String>,
    token: tokio::sync::Mutex<Option<AccessToken>>,
    cache: Mutex<PlaybackCache>,
    account: Mutex<Option<(Instant, AccountInfo)>>,
}

impl SpotifyClient {
    /// Crée un client
    ///
    /// Un refresh token déjà persisté dans `settings` remplace celui des
    /// options.
    pub fn new(options: SpotifyOptions, settings: Option<Arc<dyn SettingsStore>>) -> Result<Self> {
        let api = SpotifyApi::new(
            options.client_id.clone(),
            options.client_secret.clone(),
            options.api_base.clone(),
            options.token_url.clone(),
            options.timeout,
        )?;

        let stored = settings
            .as_ref()
            .map(|s| s.get(SETTING_REFRESH_TOKEN, ""))
            .unwrap_or_default();
        let refresh_token = if stored.trim().is_empty() {
            options.refresh_token.clone()
        } else {
            debug!("Using refresh token from settings");
            stored
        };

        Ok(Self {
            options,
            api,
            settings,
            refresh_token: Mutex::new(refresh_token),
            token: tokio::sync::Mutex::new(None),
            cache: Mutex::new(PlaybackCache::new()),
            account: Mutex::new(None),
        })
    }

    pub fn builder(options: SpotifyOptions) -> SpotifyClientBuilder {
        SpotifyClientBuilder::new(options)
    }

    pub fn options(&self) -> &SpotifyOptions {
        &self.options
    }

    /// Identifiants client et refresh token présents
    pub fn is_enabled(&self) -> bool {
        !self.options.client_id.trim().is_empty()
            && !self.options.client_secret.trim().is_empty()
            && !self.refresh_token().trim().is_empty()
    }

    pub fn cooldown_remaining(&self) -> u64 {
        self.lock_cache().cooldown_remaining()
    }

    fn refresh_token(&self) -> String {
        self.refresh_token.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn lock_cache(&self) -> MutexGuard<'_, PlaybackCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// État de lecture courant
    ///
    /// - `force` ignore la fraîcheur du cache (jamais le cooldown) ;
    /// - `allow_fetch = false` n'interroge jamais l'API.
    pub async fn get_state(&self, force: bool, allow_fetch: bool) -> PlaybackSnapshot {
        if !self.is_enabled() {
            let mut snapshot = PlaybackSnapshot::disabled();
            snapshot.cached = true;
            return snapshot;
        }

        {
            let cache = self.lock_cache();
            let remaining = cache.cooldown_remaining();
            if remaining > 0 {
                let reason = if cache.cooldown_reason().is_empty() {
                    format!("Too Many Requests (retry in {remaining}s)")
                } else {
                    cache.cooldown_reason().to_string()
                };
                let mut snapshot = cache
                    .last_served()
                    .unwrap_or_else(|| PlaybackSnapshot::cooldown(reason.clone(), None));
                snapshot.state = PlaybackState::Cooldown;
                snapshot.error = Some(reason);
                return decorate(&cache, snapshot, true);
            }

            if !allow_fetch {
                let snapshot = cache.last_served().unwrap_or_else(PlaybackSnapshot::idle);
                return decorate(&cache, snapshot, true);
            }

            if !force {
                if let Some(snapshot) = cache.fresh(self.options.cache_ttl) {
                    return decorate(&cache, snapshot, true);
                }
            }
        }

        let result = self.fetch_live_state().await;

        let mut cache = self.lock_cache();
        if result.ok {
            cache.store_success(&result);
            decorate(&cache, result, false)
        } else {
            let (served, cached) = cache.store_failure(result);
            if cached {
                debug!(state = %served.state, "Serving last known Spotify state");
            }
            decorate(&cache, served, cached)
        }
    }

    /// Met la lecture en pause, au mieux
    ///
    /// Rien n'est envoyé pendant un cooldown. Le cache est marqué périmé
    /// pour que le prochain [`get_state`](Self::get_state) relise l'état.
    pub async fn pause_playback(&self) -> PauseReport {
        if !self.is_enabled() {
            return PauseReport::failed(SpotifyError::NotConfigured.to_string());
        }

        let path = if self.options.device_id.is_empty() {
            PAUSE_PATH.to_string()
        } else {
            format!("{}?device_id={}", PAUSE_PATH, self.options.device_id)
        };

        let report = match self.call(Method::PUT, &path).await {
            CallOutcome::Reply(reply) if reply.is_success() => {
                PauseReport::ok(format!("status={}", reply.status.as_u16()))
            }
            CallOutcome::Reply(reply) => PauseReport::failed(
                reply
                    .error_message()
                    .unwrap_or_else(|| format!("pause_status_{}", reply.status.as_u16())),
            ),
            CallOutcome::RateLimited(reason) => PauseReport::failed(reason),
            CallOutcome::Failed(detail) => PauseReport::failed(detail),
        };

        self.lock_cache().mark_stale();
        info!(ok = report.ok, detail = %report.detail, "Spotify pause requested");
        report
    }

    async fn fetch_live_state(&self) -> PlaybackSnapshot {
        if let Err(e) = self.access_token().await {
            return PlaybackSnapshot::error(e.to_string());
        }
        let account = self.account().await;

        let (first_status, first_error) = match self.call(Method::GET, PLAYER_PATH).await {
            CallOutcome::Reply(reply) if reply.status == StatusCode::NO_CONTENT => {
                return PlaybackSnapshot::inactive(account);
            }
            CallOutcome::Reply(reply) if reply.status == StatusCode::OK => {
                return self.snapshot_from_body(reply.body, account);
            }
            CallOutcome::RateLimited(reason) => {
                return PlaybackSnapshot::cooldown(reason, account);
            }
            CallOutcome::Reply(reply) => (Some(reply.status), reply.error_message()),
            CallOutcome::Failed(detail) => (None, Some(detail)),
        };

        debug!(status = ?first_status, "Falling back to currently-playing");
        let (status, error) = match self.call(Method::GET, CURRENTLY_PLAYING_PATH).await {
            CallOutcome::Reply(reply) if reply.status == StatusCode::NO_CONTENT => {
                return PlaybackSnapshot::inactive(account);
            }
            CallOutcome::Reply(reply) if reply.status == StatusCode::OK => {
                return self.snapshot_from_body(reply.body, account);
            }
            CallOutcome::RateLimited(reason) => {
                return PlaybackSnapshot::cooldown(reason, account);
            }
            CallOutcome::Reply(reply) => (Some(reply.status), reply.error_message()),
            CallOutcome::Failed(detail) => (first_status, Some(detail)),
        };

        let detail = error.or(first_error).unwrap_or_else(|| match status {
            Some(code) => format!("player_status_{}", code.as_u16()),
            None => "player_unreachable".to_string(),
        });
        PlaybackSnapshot {
            account,
            ..PlaybackSnapshot::error(detail)
        }
    }

    fn snapshot_from_body(&self, body: Option<Value>, account: Option<AccountInfo>) -> PlaybackSnapshot {
        let payload = match body.map(serde_json::from_value::<PlayerPayload>) {
            Some(Ok(payload)) => payload,
            Some(Err(e)) => {
                warn!(error = %e, "Unreadable Spotify player payload");
                return PlaybackSnapshot::error("invalid_player_payload");
            }
            None => return PlaybackSnapshot::error("invalid_player_payload"),
        };

        let wire_device = payload.device.unwrap_or_default();
        let device = DeviceInfo {
            id: wire_device.id.unwrap_or_default(),
            name: wire_device.name.unwrap_or_default(),
            kind: wire_device.kind.unwrap_or_default(),
            volume_percent: wire_device.volume_percent,
        };
        if device.id.is_empty() && device.name.is_empty() {
            return PlaybackSnapshot::inactive(account);
        }

        let item = payload.item.unwrap_or_default();
        let album = item.album.unwrap_or_default();
        let track = TrackInfo {
            id: item.id.unwrap_or_default(),
            name: item.name.unwrap_or_default(),
            artists: item
                .artists
                .into_iter()
                .filter_map(|a| a.name)
                .filter(|n| !n.is_empty())
                .collect(),
            album: album.name.unwrap_or_default(),
            duration_ms: item.duration_ms.unwrap_or(0),
        };

        let state = if payload.is_playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        };

        PlaybackSnapshot {
            on_device: device_matches(&self.options.device_id, &self.options.device_name, &device),
            device,
            track,
            progress_ms: payload.progress_ms.unwrap_or(0),
            images: CoverImages::from_wire(&album.images),
            shuffle_state: payload.shuffle_state.unwrap_or(false),
            repeat_state: payload
                .repeat_state
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| "off".to_string()),
            account,
            ..PlaybackSnapshot::empty(true, state, None)
        }
    }

    /// Nom du compte, mis en cache ; au mieux
    async fn account(&self) -> Option<AccountInfo> {
        let cached = self.account.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some((at, info)) = &cached {
            if at.elapsed() < ACCOUNT_TTL {
                return Some(info.clone());
            }
        }

        match self.call(Method::GET, ME_PATH).await {
            CallOutcome::Reply(reply) if reply.status == StatusCode::OK => {
                let me: MePayload = reply
                    .body
                    .and_then(|b| serde_json::from_value(b).ok())
                    .unwrap_or_default();
                let info = AccountInfo {
                    display_name: me.display_name.unwrap_or_default(),
                };
                *self.account.lock().unwrap_or_else(|e| e.into_inner()) = Some((Instant::now(), info.clone()));
                Some(info)
            }
            _ => cached.map(|(_, info)| info),
        }
    }

    /// Appel authentifié avec gestion du cooldown, du 401 et du 429
    async fn call(&self, method: Method, path: &str) -> CallOutcome {
        let remaining = self.cooldown_remaining();
        if remaining > 0 {
            debug!(endpoint = path, remaining, "Spotify call skipped during cooldown");
            let reason = self.lock_cache().cooldown_reason().to_string();
            return CallOutcome::RateLimited(reason);
        }

        let mut retried = false;
        loop {
            let token = match self.access_token().await {
                Ok(token) => token,
                Err(e) => return CallOutcome::Failed(e.to_string()),
            };

            let reply = match self.api.send(method.clone(), path, &token).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(endpoint = path, method = %method, error = %e, "Spotify API call failed");
                    return CallOutcome::Failed(e.to_string());
                }
            };

            if reply.status == StatusCode::TOO_MANY_REQUESTS {
                let reason = self.enter_cooldown(reply.retry_after);
                self.log_call(&method, path, &reply);
                return CallOutcome::RateLimited(reason);
            }
            self.log_call(&method, path, &reply);

            if reply.status == StatusCode::UNAUTHORIZED && !retried {
                info!(endpoint = path, "Spotify token rejected, refreshing");
                self.invalidate_token(&token).await;
                retried = true;
                continue;
            }

            return CallOutcome::Reply(reply);
        }
    }

    fn log_call(&self, method: &Method, path: &str, reply: &ApiReply) {
        let cooldown_until = self.lock_cache().cooldown_deadline();
        let status = reply.status.as_u16();
        if reply.is_success() {
            debug!(endpoint = path, method = %method, status, "Spotify API call");
        } else {
            info!(
                endpoint = path,
                method = %method,
                status,
                retry_after = ?reply.retry_after,
                cooldown_until = ?cooldown_until,
                "Spotify API call"
            );
        }
    }

    fn enter_cooldown(&self, retry_after: Option<u64>) -> String {
        let max = self
            .options
            .rate_limit_max_backoff
            .as_secs()
            .max(MIN_RATE_LIMIT_SECS);
        let secs = retry_after
            .unwrap_or(self.options.rate_limit_backoff.as_secs())
            .clamp(MIN_RATE_LIMIT_SECS, max);
        let reason = format!("Too Many Requests (retry in {secs}s)");

        warn!(retry_after = ?retry_after, cooldown_secs = secs, "Spotify rate limit, entering cooldown");
        self.lock_cache()
            .enter_cooldown(Duration::from_secs(secs), reason.clone());
        reason
    }

    /// Token d'accès valide, rafraîchi si besoin
    ///
    /// Le verrou est tenu pendant le rafraîchissement : des appels
    /// concurrents attendent le même token.
    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let refresh_token = self.refresh_token();
        if refresh_token.trim().is_empty() {
            return Err(SpotifyError::NotConfigured);
        }

        let grant = self.api.refresh_access_token(&refresh_token).await?;
        if let Some(rotated) = grant.refresh_token.as_deref() {
            if rotated != refresh_token {
                self.store_refresh_token(rotated);
            }
        }

        let lifetime = grant
            .expires_in
            .saturating_sub(TOKEN_EXPIRY_MARGIN_SECS)
            .max(TOKEN_EXPIRY_MARGIN_SECS);
        *guard = Some(AccessToken {
            value: grant.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });
        info!(expires_in = grant.expires_in, "Spotify access token refreshed");
        Ok(grant.access_token)
    }

    /// Oublie le token s'il est toujours celui qui a été refusé
    async fn invalidate_token(&self, rejected: &str) {
        let mut guard = self.token.lock().await;
        if guard.as_ref().is_some_and(|t| t.value == rejected) {
            *guard = None;
        }
    }

    fn store_refresh_token(&self, token: &str) {
        *self.refresh_token.lock().unwrap_or_else(|e| e.into_inner()) = token.to_string();
        info!("Spotify refresh token rotated");

        if let Some(settings) = &self.settings {
            if let Err(e) = settings.set(SETTING_REFRESH_TOKEN, token) {
                warn!(error = %e, "Failed to persist rotated refresh token");
            }
        }
    }
}

fn decorate(cache: &PlaybackCache, mut snapshot: PlaybackSnapshot, cached: bool) -> PlaybackSnapshot {
    snapshot.cached = cached;
    snapshot.last_fetch_age_s = cache.last_fetch_age();
    snapshot.cooldown_remaining_s = cache.cooldown_remaining();
    snapshot
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// La lecture a lieu sur l'appareil PartyBox
///
/// Un identifiant configuré doit correspondre exactement ; sinon les noms
/// sont comparés sans casse, espaces normalisés.
pub fn device_matches(device_id: &str, device_name: &str, device: &DeviceInfo) -> bool {
    if !device_id.trim().is_empty() {
        return device.id == device_id.trim();
    }
    let wanted = normalize_name(device_name);
    !wanted.is_empty() && normalize_name(&device.name) == wanted
}
