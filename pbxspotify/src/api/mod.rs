//! Couche d'accès HTTP à l'API Web Spotify et au service de comptes
//!
//! Cette couche ne connaît ni le cache ni le cooldown : elle exécute une
//! requête et rend le statut, le corps JSON éventuel et l'en-tête
//! `Retry-After`. Le [`crate::SpotifyClient`] décide du reste.

pub mod auth;

use crate::error::Result;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// URL du point d'accès `token` du service de comptes
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// URL de base de l'API Web
pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

/// Délai minimal d'une requête HTTP
const MIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Réponse brute d'un appel à l'API Web
#[derive(Debug, Clone)]
pub struct ApiReply {
    pub status: StatusCode,
    /// Corps JSON, absent pour 204 ou un corps illisible
    pub body: Option<Value>,
    /// `Retry-After` en secondes entières, s'il est présent et lisible
    pub retry_after: Option<u64>,
}

impl ApiReply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// `error.message` du corps d'erreur Spotify, s'il est présent
    pub fn error_message(&self) -> Option<String> {
        self.body
            .as_ref()
            .and_then(|b| b.pointer("/error/message"))
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
    }
}

/// Client HTTP bas-niveau pour l'API Web et le service de comptes
#[derive(Debug, Clone)]
pub struct SpotifyApi {
    client: Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl SpotifyApi {
    /// Crée le client HTTP avec le délai donné (au moins 500 ms)
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        api_base: impl Into<String>,
        token_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout.max(MIN_TIMEOUT))
            .user_agent(concat!("PartyBox/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exécute une requête authentifiée sur l'API Web
    ///
    /// Seules les erreurs de transport remontent en `Err` ; tout statut HTTP
    /// est rendu dans l'[`ApiReply`].
    pub async fn send(&self, method: Method, path: &str, access_token: &str) -> Result<ApiReply> {
        let url = format!("{}{}", self.api_base, path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method.clone(), &url).bearer_auth(access_token);
        if method != Method::GET {
            // Spotify exige un Content-Length sur PUT/POST
            request = request.body("");
        }

        let response = request.send().await?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<Value>(&text).ok()
        };

        Ok(ApiReply {
            status,
            body,
            retry_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message_from_body() {
        let reply = ApiReply {
            status: StatusCode::BAD_GATEWAY,
            body: Some(json!({"error": {"status": 502, "message": "Bad gateway upstream"}})),
            retry_after: None,
        };
        assert_eq!(reply.error_message().as_deref(), Some("Bad gateway upstream"));

        let reply = ApiReply {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: None,
            retry_after: None,
        };
        assert!(reply.error_message().is_none());
    }

    #[test]
    fn test_api_base_trailing_slash() {
        let api = SpotifyApi::new("id", "secret", "http://localhost:1/v1/", DEFAULT_TOKEN_URL, Duration::ZERO)
            .unwrap();
        assert_eq!(api.api_base(), "http://localhost:1/v1");
    }
}
