//! Modèles de données : instantané de lecture exposé, et formes JSON de l'API

use serde::{Deserialize, Serialize};
use std::fmt;

/// État de lecture tel que vu par PartyBox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Identifiants absents : aucun appel réseau
    Disabled,
    /// Fenêtre de pénalité après un 429
    Cooldown,
    /// Aucune donnée encore récupérée
    Idle,
    /// Aucun appareil actif sur le compte
    Inactive,
    Playing,
    Paused,
    Error,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Cooldown => "cooldown",
            Self::Idle => "idle",
            Self::Inactive => "inactive",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub volume_percent: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration_ms: u64,
}

/// Pochettes, de la plus petite à la plus grande
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverImages {
    pub small: String,
    pub medium: String,
    pub large: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub display_name: String,
}

/// Instantané de lecture retourné par [`crate::SpotifyClient::get_state`]
///
/// `cached`, `last_fetch_age_s` et `cooldown_remaining_s` sont recalculés à
/// chaque appel ; le reste provient du dernier appel à l'API (ou du cache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub ok: bool,
    pub state: PlaybackState,
    /// La lecture a lieu sur l'appareil PartyBox
    #[serde(rename = "spotify_on_partybox")]
    pub on_device: bool,
    pub device: DeviceInfo,
    pub track: TrackInfo,
    pub progress_ms: u64,
    pub images: CoverImages,
    pub shuffle_state: bool,
    pub repeat_state: String,
    /// Horodatage Unix de la construction de l'instantané
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountInfo>,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub last_fetch_age_s: Option<u64>,
    #[serde(default)]
    pub cooldown_remaining_s: u64,
}

impl PlaybackSnapshot {
    /// Instantané sans données de lecture
    pub fn empty(ok: bool, state: PlaybackState, error: Option<String>) -> Self {
        Self {
            ok,
            state,
            on_device: false,
            device: DeviceInfo::default(),
            track: TrackInfo::default(),
            progress_ms: 0,
            images: CoverImages::default(),
            shuffle_state: false,
            repeat_state: "off".to_string(),
            ts: chrono::Utc::now().timestamp(),
            error,
            account: None,
            cached: false,
            last_fetch_age_s: None,
            cooldown_remaining_s: 0,
        }
    }

    pub fn disabled() -> Self {
        Self::empty(false, PlaybackState::Disabled, Some("spotify_not_configured".into()))
    }

    pub fn idle() -> Self {
        Self::empty(true, PlaybackState::Idle, None)
    }

    pub fn inactive(account: Option<AccountInfo>) -> Self {
        Self {
            account,
            ..Self::empty(true, PlaybackState::Inactive, None)
        }
    }

    pub fn cooldown(reason: impl Into<String>, account: Option<AccountInfo>) -> Self {
        Self {
            account,
            ..Self::empty(false, PlaybackState::Cooldown, Some(reason.into()))
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self::empty(false, PlaybackState::Error, Some(detail.into()))
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }
}

// ============ Formes JSON de l'API Web ============

/// Réponse de `GET /me/player` et `GET /me/player/currently-playing`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PlayerPayload {
    pub device: Option<WireDevice>,
    pub item: Option<WireItem>,
    pub is_playing: bool,
    pub progress_ms: Option<u64>,
    pub shuffle_state: Option<bool>,
    pub repeat_state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireDevice {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub volume_percent: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireItem {
    pub id: Option<String>,
    pub name: Option<String>,
    pub duration_ms: Option<u64>,
    pub artists: Vec<WireArtist>,
    pub album: Option<WireAlbum>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireArtist {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireAlbum {
    pub name: Option<String>,
    pub images: Vec<WireImage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireImage {
    pub url: Option<String>,
    pub width: Option<u64>,
}

/// Réponse de `GET /me`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct MePayload {
    pub display_name: Option<String>,
}

/// Réponse du point d'accès `token` du service de comptes
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct TokenPayload {
    pub access_token: Option<String>,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CoverImages {
    /// Trie les images par largeur et retient la plus petite, celle du
    /// milieu et la plus grande
    pub(crate) fn from_wire(images: &[WireImage]) -> Self {
        let mut sized: Vec<(u64, &str)> = images
            .iter()
            .filter_map(|img| {
                img.url
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .map(|u| (img.width.unwrap_or(0), u))
            })
            .collect();
        if sized.is_empty() {
            return Self::default();
        }
        sized.sort_by_key(|(width, _)| *width);

        Self {
            small: sized[0].1.to_string(),
            medium: sized[sized.len() / 2].1.to_string(),
            large: sized[sized.len() - 1].1.to_string(),
        }
    }
}
