//! Vue d'état combinée : modes média et lecture Spotify

use pbxmode::ModeOrchestrator;
use pbxspotify::SpotifyClient;
use serde_json::{Value, json};

/// `{ "media_mode": ..., "spotify": ... }`
///
/// `refresh` ignore les deux caches (mais jamais le cooldown Spotify).
pub async fn combined_status(
    orchestrator: &ModeOrchestrator,
    spotify: &SpotifyClient,
    refresh: bool,
) -> Value {
    let (mode, playback) = tokio::join!(
        orchestrator.get_status(refresh),
        spotify.get_state(refresh, true)
    );
    json!({
        "media_mode": mode,
        "spotify": playback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbxmode::ModeOptions;
    use pbxsettings::MemorySettings;
    use pbxspotify::SpotifyOptions;
    use pbxutils::ScriptedRunner;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_combined_shape() {
        let orchestrator = ModeOrchestrator::new(
            Arc::new(ScriptedRunner::new()),
            Arc::new(MemorySettings::seeded([("media_mode", "airplay")])),
            ModeOptions::default(),
        );
        let spotify = SpotifyClient::new(SpotifyOptions::default(), None).unwrap();

        let status = combined_status(&orchestrator, &spotify, false).await;
        assert_eq!(status["media_mode"]["mode"], "airplay");
        assert_eq!(status["spotify"]["state"], "disabled");
        assert_eq!(status["spotify"]["error"], "spotify_not_configured");
    }
}
