//! Assemblage des composants à partir de la configuration

use crate::pause::SpotifyPause;
use anyhow::{Context, Result};
use pbxconfig::Config;
use pbxmode::{ModeConfigExt, ModeOrchestrator};
use pbxsettings::{MemorySettings, SettingsStore, SqliteSettings};
use pbxspotify::{SpotifyClient, SpotifyConfigExt};
use pbxutils::{CommandRunner, ScriptedRunner, SystemRunner};
use std::sync::Arc;
use tracing::info;

/// Composants d'une invocation de la ligne de commande
pub struct App {
    pub orchestrator: ModeOrchestrator,
    pub spotify: Arc<SpotifyClient>,
    /// Exécuteur simulé en mode `--dry-run`
    pub recorder: Option<Arc<ScriptedRunner>>,
}

impl App {
    /// Construit l'application
    ///
    /// En `--dry-run`, aucune commande n'est exécutée, les réglages sont une
    /// copie en mémoire de la base et le client Spotify reste désactivé.
    pub fn from_config(config: &Config, dry_run: bool) -> Result<Self> {
        let db_path = config.get_settings_db_path()?;
        let sqlite = SqliteSettings::open(&db_path)
            .with_context(|| format!("cannot open settings database {}", db_path.display()))?;

        let mut spotify_options = config.get_spotify_options()?;
        let mode_options = config.get_mode_options()?;

        let (settings, runner, recorder): (Arc<dyn SettingsStore>, Arc<dyn CommandRunner>, _) =
            if dry_run {
                info!("Dry run: commands are recorded, not executed");
                let scripted = Arc::new(ScriptedRunner::new());
                spotify_options.client_id.clear();
                (
                    Arc::new(MemorySettings::seeded(sqlite.entries())),
                    scripted.clone(),
                    Some(scripted),
                )
            } else {
                (Arc::new(sqlite), Arc::new(SystemRunner::new()), None)
            };

        let spotify = Arc::new(SpotifyClient::new(spotify_options, Some(settings.clone()))?);
        let orchestrator = ModeOrchestrator::new(runner, settings, mode_options);

        Ok(Self {
            orchestrator,
            spotify,
            recorder,
        })
    }

    pub fn pause_hook(&self) -> SpotifyPause {
        SpotifyPause::new(self.spotify.clone())
    }

    /// Commandes enregistrées en `--dry-run`
    pub fn recorded_commands(&self) -> Vec<String> {
        self.recorder
            .as_ref()
            .map(|r| r.take_calls())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbxmode::MediaMode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_dry_run_records_without_touching_database() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        let app = App::from_config(&config, true).unwrap();
        assert!(!app.spotify.is_enabled());

        let outcome = app
            .orchestrator
            .set_mode(MediaMode::AirplayReceiver, None, false)
            .await;
        assert!(outcome.ok, "{}", outcome.error);

        let commands = app.recorded_commands();
        assert!(commands.iter().any(|c| c.contains("start partybox-airplay.service")));

        // la base réelle n'a pas été modifiée
        let db = SqliteSettings::open(&config.get_settings_db_path().unwrap()).unwrap();
        assert_eq!(db.get("media_mode", "partybox"), "partybox");
    }
}
