//! Rafraîchissement du token OAuth (grant `refresh_token`)

use super::SpotifyApi;
use crate::error::{Result, SpotifyError};
use crate::models::TokenPayload;
use tracing::{debug, warn};

/// Durée de vie supposée quand la réponse n'indique pas `expires_in`
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Token obtenu auprès du service de comptes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
    /// Nouveau refresh token, si le fournisseur l'a fait tourner
    pub refresh_token: Option<String>,
}

impl SpotifyApi {
    /// Échange le refresh token contre un token d'accès
    ///
    /// Authentification HTTP Basic avec les identifiants client, corps en
    /// `application/x-www-form-urlencoded`.
    ///
    /// # Errors
    ///
    /// [`SpotifyError::Auth`] porte le détail du fournisseur
    /// (`error_description`, puis `error`, puis `token_refresh_status_<code>`),
    /// ou `token_missing` si la réponse ne contient pas de token.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        debug!("Refreshing Spotify access token");

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let payload: TokenPayload = serde_json::from_str(&text).unwrap_or_default();

        if !status.is_success() {
            let detail = payload
                .error_description
                .filter(|d| !d.is_empty())
                .or(payload.error.filter(|e| !e.is_empty()))
                .unwrap_or_else(|| format!("token_refresh_status_{}", status.as_u16()));
            warn!(status = status.as_u16(), detail = %detail, "Spotify token refresh failed");
            return Err(SpotifyError::Auth(detail));
        }

        let access_token = payload
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SpotifyError::Auth("token_missing".into()))?;

        Ok(TokenGrant {
            access_token,
            expires_in: payload.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            refresh_token: payload.refresh_token.filter(|t| !t.is_empty()),
        })
    }
}
