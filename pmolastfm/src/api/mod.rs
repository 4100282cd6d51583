//! Couche d'accès à l'API Last.fm 2.0
//!
//! Ce module fournit une interface bas-niveau pour communiquer avec le web
//! service : chaque appel est signé (voir [`signing`]) et la réponse XML est
//! renvoyée telle quelle dans une [`ApiResponse`] dont l'appelant vérifie le statut.

pub mod auth;
pub mod radio;
pub mod response;
pub mod signing;

pub use response::ApiResponse;
pub use signing::Params;

use crate::error::Result;
use crate::models::{ApiCredentials, RequestMode, Session};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// URL par défaut du web service
pub const DEFAULT_API_URL: &str = "http://ws.audioscrobbler.com/2.0/";

/// Timeout par défaut des appels API
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// User-Agent par défaut
pub const DEFAULT_USER_AGENT: &str = concat!("pmolastfm/", env!("CARGO_PKG_VERSION"));

/// Client API bas-niveau, partageable entre sessions
///
/// Le client ne porte aucun état de session : la [`Session`] est passée
/// explicitement à chaque appel signé.
#[derive(Debug, Clone)]
pub struct LastFmApi {
    client: Client,
    api_url: String,
    credentials: Arc<ApiCredentials>,
}

impl LastFmApi {
    /// Crée un client avec l'URL et le timeout par défaut
    pub fn new(credentials: ApiCredentials) -> Result<Self> {
        Self::builder(credentials).build()
    }

    /// Crée un builder pour configurer le client
    pub fn builder(credentials: ApiCredentials) -> LastFmApiBuilder {
        LastFmApiBuilder::new(credentials)
    }

    /// URL du web service
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Clé d'API de l'application
    pub fn api_key(&self) -> &str {
        &self.credentials.api_key
    }

    /// Client HTTP interne
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    /// Signe les paramètres et renvoie la chaîne de requête encodée
    ///
    /// Ajoute `method`, `api_key` et, si une session est fournie, `sk`.
    pub fn signed_request(
        &self,
        method: &str,
        mut params: Params,
        session: Option<&Session>,
    ) -> String {
        params.insert("method".to_string(), method.to_string());
        params.insert("api_key".to_string(), self.credentials.api_key.clone());
        if let Some(session) = session {
            params.insert("sk".to_string(), session.key.clone());
        }

        let signature = signing::api_signature(&params, &self.credentials.api_secret);
        signing::encode_request(&params, &signature)
    }

    /// Effectue un appel signé
    ///
    /// # Errors
    ///
    /// * `LastFmError::Transport` - Échec réseau
    /// * `LastFmError::Protocol` - Corps de réponse illisible
    ///
    /// Un statut d'échec du service n'est pas une erreur à ce niveau :
    /// l'appelant doit tester [`ApiResponse::status`].
    pub async fn call(
        &self,
        method: &str,
        mode: RequestMode,
        params: Params,
        session: Option<&Session>,
    ) -> Result<ApiResponse> {
        let request = self.signed_request(method, params, session);

        debug!("{:?} {} -> {}", mode, method, self.api_url);

        let builder = match mode {
            RequestMode::Read => {
                let separator = if self.api_url.contains('?') { '&' } else { '?' };
                self.client
                    .get(format!("{}{}{}", self.api_url, separator, request))
            }
            RequestMode::Write => self
                .client
                .post(&self.api_url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(request),
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        trace!("{} answered HTTP {} ({} bytes)", method, status, body.len());

        ApiResponse::parse(&body)
    }
}

/// Builder pour configurer un [`LastFmApi`]
#[derive(Debug)]
pub struct LastFmApiBuilder {
    credentials: ApiCredentials,
    client: Option<Client>,
    api_url: String,
    timeout: Duration,
    user_agent: String,
}

impl LastFmApiBuilder {
    pub fn new(credentials: ApiCredentials) -> Self {
        Self {
            credentials,
            client: None,
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Utilise un client HTTP existant
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Change l'URL du web service
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Timeout des appels API
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// User-Agent envoyé au service
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<LastFmApi> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(&self.user_agent)
                .timeout(self.timeout)
                .build()?,
        };

        Ok(LastFmApi {
            client,
            api_url: self.api_url,
            credentials: Arc::new(self.credentials),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> LastFmApi {
        LastFmApi::new(ApiCredentials::new("key", "secret")).unwrap()
    }

    #[test]
    fn test_api_creation() {
        let api = api();
        assert_eq!(api.api_url(), DEFAULT_API_URL);
        assert_eq!(api.api_key(), "key");
    }

    #[test]
    fn test_signed_request_without_session() {
        let mut params = Params::new();
        params.insert("username".to_string(), "rj".to_string());

        let request = api().signed_request("auth.getMobileSession", params, None);
        let expected_sig =
            signing::md5_hex("api_keykeymethodauth.getMobileSessionusernamerjsecret");

        assert_eq!(
            request,
            format!("api_key=key&method=auth.getMobileSession&username=rj&api_sig={expected_sig}")
        );
        assert!(!request.contains("sk="));
    }

    #[test]
    fn test_signed_request_includes_session_key() {
        let session = Session {
            username: "rj".to_string(),
            key: "sessionkey".to_string(),
        };
        let request = api().signed_request("radio.getPlaylist", Params::new(), Some(&session));

        let expected_sig =
            signing::md5_hex("api_keykeymethodradio.getPlaylistsksessionkeysecret");
        assert_eq!(
            request,
            format!("api_key=key&method=radio.getPlaylist&sk=sessionkey&api_sig={expected_sig}")
        );
    }
}
