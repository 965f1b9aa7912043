//! Pause Spotify branchée sur l'orchestrateur de modes

use async_trait::async_trait;
use pbxmode::{PauseHook, PauseReport};
use pbxspotify::SpotifyClient;
use std::sync::Arc;

/// Met en pause la lecture Spotify avant de quitter le mode `spotify`
pub struct SpotifyPause {
    client: Arc<SpotifyClient>,
}

impl SpotifyPause {
    pub fn new(client: Arc<SpotifyClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PauseHook for SpotifyPause {
    async fn pause(&self) -> PauseReport {
        self.client.pause_playback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbxspotify::SpotifyOptions;

    #[tokio::test]
    async fn test_unconfigured_client_reports_failure() {
        let client = Arc::new(SpotifyClient::new(SpotifyOptions::default(), None).unwrap());
        let report = SpotifyPause::new(client).pause().await;
        assert!(!report.ok);
        assert_eq!(report.detail, "spotify_not_configured");
    }
}
