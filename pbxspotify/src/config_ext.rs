//! Extension pour lire la configuration Spotify depuis pbxconfig
//!
//! Les secrets (`client_secret`, `refresh_token`) peuvent être stockés en
//! clair ou chiffrés (`encrypted:...`, voir [`pbxconfig::encryption`]).

use crate::client::SpotifyOptions;
use anyhow::{Context, Result};
use pbxconfig::Config;
use pbxconfig::encryption::reveal_secret;
use std::time::Duration;

const SECTION: &str = "spotify";

/// Bornes du délai HTTP, en secondes
const MIN_TIMEOUT_SECS: f64 = 0.5;
const MAX_TIMEOUT_SECS: f64 = 60.0;

/// Trait d'extension de `pbxconfig::Config` pour le client Spotify
pub trait SpotifyConfigExt {
    /// Options du client ; les valeurs absentes prennent leur défaut
    ///
    /// # Errors
    ///
    /// Secret chiffré illisible sur cette machine.
    fn get_spotify_options(&self) -> Result<SpotifyOptions>;
}

impl SpotifyConfigExt for Config {
    fn get_spotify_options(&self) -> Result<SpotifyOptions> {
        let d = SpotifyOptions::default();
        let s = |key: &str, default: &str| self.get_string(&[SECTION, key], default).trim().to_string();
        let secret = |key: &str| {
            reveal_secret(&s(key, "")).with_context(|| format!("cannot read {SECTION}.{key}"))
        };

        let timeout = self.get_f64(&[SECTION, "timeout_secs"], d.timeout.as_secs_f64());
        let timeout = if timeout.is_finite() {
            timeout.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
        } else {
            d.timeout.as_secs_f64()
        };

        Ok(SpotifyOptions {
            client_id: s("client_id", ""),
            client_secret: secret("client_secret")?,
            refresh_token: secret("refresh_token")?,
            device_name: s("device_name", &d.device_name),
            device_id: s("device_id", ""),
            cache_ttl: Duration::from_secs(
                self.get_u64(&[SECTION, "cache_secs"], d.cache_ttl.as_secs()).max(1),
            ),
            timeout: Duration::from_secs_f64(timeout),
            rate_limit_backoff: Duration::from_secs(self.get_u64(
                &[SECTION, "rate_limit_backoff_secs"],
                d.rate_limit_backoff.as_secs(),
            )),
            rate_limit_max_backoff: Duration::from_secs(self.get_u64(
                &[SECTION, "rate_limit_max_backoff_secs"],
                d.rate_limit_max_backoff.as_secs(),
            )),
            api_base: s("api_base", &d.api_base),
            token_url: s("token_url", &d.token_url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_leave_client_disabled() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        let options = config.get_spotify_options().unwrap();

        assert!(options.client_id.is_empty());
        assert_eq!(options.device_name, "PartyBox");
        assert_eq!(options.cache_ttl, Duration::from_secs(15));
        assert_eq!(options.timeout, Duration::from_secs(2));
        assert_eq!(options.rate_limit_max_backoff, Duration::from_secs(300));
    }

    #[test]
    fn test_values_are_trimmed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "spotify:\n  client_id: \" abc \"\n  client_secret: s3cret\n  refresh_token: tok\n  timeout_secs: 0.1\n  cache_secs: 0\n",
        )
        .unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        let options = config.get_spotify_options().unwrap();

        assert_eq!(options.client_id, "abc");
        assert_eq!(options.client_secret, "s3cret");
        assert_eq!(options.refresh_token, "tok");
        assert_eq!(options.timeout, Duration::from_millis(500));
        assert_eq!(options.cache_ttl, Duration::from_secs(1));
    }

    #[test]
    fn test_timeout_not_finite_or_huge() {
        let options_for = |raw: &str| {
            let dir = TempDir::new().unwrap();
            std::fs::write(
                dir.path().join("config.yaml"),
                format!("spotify:\n  timeout_secs: {raw}\n"),
            )
            .unwrap();
            let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
            config.get_spotify_options().unwrap()
        };

        assert_eq!(options_for(".inf").timeout, Duration::from_secs(2));
        assert_eq!(options_for(".nan").timeout, Duration::from_secs(2));
        assert_eq!(options_for("1e300").timeout, Duration::from_secs(60));
        assert_eq!(options_for("-3").timeout, Duration::from_millis(500));
    }
}
