//! # pbxutils - Utilitaires partagés de PartyBox
//!
//! Cette crate regroupe les briques bas-niveau communes aux autres crates :
//!
//! - [`process`] : exécution de commandes externes avec timeout strict,
//!   destruction du groupe de processus en cas de blocage, et un résultat
//!   uniforme ([`CommandOutput`]) qui ne remonte jamais d'erreur.
//!
//! ## Exemple
//!
//! ```no_run
//! use pbxutils::{CommandRunner, SystemRunner};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let runner = SystemRunner::new();
//! let out = runner
//!     .run("systemctl", &["is-active", "librespot.service"], Duration::from_secs(5))
//!     .await;
//! println!("{} -> ok={} stdout={}", out.command, out.ok, out.stdout);
//! # }
//! ```

pub mod process;

pub use process::{
    CommandOutput, CommandRunner, ScriptedReply, ScriptedRunner, SystemRunner, render_command,
};
