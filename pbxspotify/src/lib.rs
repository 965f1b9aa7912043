//! # pbxspotify - Client Spotify résilient pour PartyBox
//!
//! Cette crate lit l'état de lecture Spotify Connect (Web API) pour
//! l'écran et l'interface de PartyBox, sans jamais faire échouer
//! l'appelant :
//!
//! - token OAuth rafraîchi à la demande (grant `refresh_token`), refresh
//!   token renouvelé persisté dans les réglages ;
//! - cache à durée de vie courte (15 s par défaut) ;
//! - cooldown après un 429, pendant lequel aucun appel n'est émis ;
//! - « stale-while-error » : en cas d'échec, le dernier état connu est servi
//!   avec l'état et l'erreur mis à jour ;
//! - pause au mieux, utilisée par l'orchestrateur avant de quitter le mode
//!   Spotify.
//!
//! ## Exemple
//!
//! ```no_run
//! use pbxspotify::{SpotifyClient, SpotifyOptions};
//!
//! # async fn example() -> pbxspotify::Result<()> {
//! let options = SpotifyOptions {
//!     client_id: "my-client-id".into(),
//!     client_secret: "my-secret".into(),
//!     refresh_token: "AQD...".into(),
//!     ..Default::default()
//! };
//! let client = SpotifyClient::new(options, None)?;
//!
//! let state = client.get_state(false, true).await;
//! println!("{} on_device={} {}", state.state, state.on_device, state.track.name);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod client;
pub mod config_ext;
pub mod error;
pub mod models;

pub use client::{SETTING_REFRESH_TOKEN, SpotifyClient, SpotifyClientBuilder, SpotifyOptions, device_matches};
pub use config_ext::SpotifyConfigExt;
pub use error::{Result, SpotifyError};
pub use models::{AccountInfo, CoverImages, DeviceInfo, PlaybackSnapshot, PlaybackState, TrackInfo};
