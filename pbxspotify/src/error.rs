//! Types d'erreurs pour pbxspotify

use thiserror::Error;

/// Type Result personnalisé pour pbxspotify
pub type Result<T> = std::result::Result<T, SpotifyError>;

/// Erreurs du client Spotify
///
/// Elles ne sortent jamais de [`crate::SpotifyClient::get_state`] : le client
/// les convertit en instantané d'erreur. Seule la couche [`crate::api`] les
/// expose.
#[derive(Error, Debug)]
pub enum SpotifyError {
    /// Erreur réseau (connexion, délai dépassé)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Échec du rafraîchissement du token OAuth
    ///
    /// Le message est le détail du fournisseur (`error_description`,
    /// `error`, ou `token_refresh_status_<code>`).
    #[error("{0}")]
    Auth(String),

    /// Identifiants absents de la configuration
    #[error("spotify_not_configured")]
    NotConfigured,
}

impl SpotifyError {
    /// Erreur liée à l'authentification (token refusé ou absent)
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_detail_is_displayed_verbatim() {
        let err = SpotifyError::Auth("Invalid refresh token".into());
        assert_eq!(err.to_string(), "Invalid refresh token");
        assert!(err.is_auth_error());
        assert_eq!(SpotifyError::NotConfigured.to_string(), "spotify_not_configured");
    }
}
