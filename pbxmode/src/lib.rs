//! # pbxmode - Orchestrateur des modes média de PartyBox
//!
//! PartyBox possède une seule sortie audio/vidéo, partagée entre plusieurs
//! services exclusifs (lecteur local, Spotify Connect, AirPlay, Bluetooth),
//! un mode d'affichage passif et un mode silencieux. Cette crate passe d'un
//! mode à l'autre de façon sûre et idempotente.
//!
//! ## Architecture
//!
//! - [`mode`] : [`MediaMode`] et le [`ServicePlan`] (services gérés, services par mode)
//! - [`infra`] : systemctl, bluetoothctl et mixeur, via un [`pbxutils::CommandRunner`]
//! - [`actions`] : journal d'actions borné, persisté après chaque tentative
//! - [`status`] : vue d'état et son cache
//! - [`orchestrator`] : [`ModeOrchestrator`]
//! - [`config_ext`] : lecture des options depuis `pbxconfig`
//!
//! ## Exemple
//!
//! ```no_run
//! use pbxmode::{MediaMode, ModeOptions, ModeOrchestrator};
//! use pbxsettings::MemorySettings;
//! use pbxutils::SystemRunner;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let orchestrator = ModeOrchestrator::new(
//!     Arc::new(SystemRunner::new()),
//!     Arc::new(MemorySettings::new()),
//!     ModeOptions::default(),
//! );
//!
//! let outcome = orchestrator.set_mode(MediaMode::AirplayReceiver, None, false).await;
//! if !outcome.ok {
//!     eprintln!("switch failed: {} (now {})", outcome.error, outcome.mode);
//! }
//! # }
//! ```

pub mod actions;
pub mod config_ext;
pub mod error;
pub mod hook;
pub mod infra;
pub mod mode;
pub mod orchestrator;
pub mod status;

pub use actions::{ActionKind, ActionLog, ActionRecord};
pub use config_ext::ModeConfigExt;
pub use error::{ModeError, Result};
pub use hook::{PauseHook, PauseReport};
pub use mode::{ManagedService, MediaMode, ServicePlan};
pub use orchestrator::{DiscoverableOutcome, ModeOptions, ModeOrchestrator, ModeSwitchOutcome};
pub use status::{ModeStatus, UnitStatus};
