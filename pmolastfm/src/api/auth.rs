//! Module d'authentification pour l'API Last.fm

use super::signing::md5_hex;
use super::{LastFmApi, Params};
use crate::error::{LastFmError, Result};
use crate::models::{RequestMode, Session};
use tracing::{debug, info, warn};

/// Jeton d'authentification mobile : `md5(username + md5(password))`
pub fn mobile_auth_token(username: &str, password: &str) -> String {
    md5_hex(&format!("{}{}", username, md5_hex(password)))
}

impl LastFmApi {
    /// Authentifie l'utilisateur et renvoie une session
    ///
    /// # Arguments
    ///
    /// * `username` - Nom d'utilisateur Last.fm
    /// * `password` - Mot de passe en clair (seul son MD5 quitte la machine)
    ///
    /// # Errors
    ///
    /// * `LastFmError::Auth` - Le service a refusé les credentials
    /// * `LastFmError::Protocol` - Réponse positive sans clé de session
    /// * `LastFmError::Transport` - Échec réseau
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Session> {
        info!("Attempting to login to Last.fm as {}", username);

        let mut params = Params::new();
        params.insert("username".to_string(), username.to_string());
        params.insert(
            "authToken".to_string(),
            mobile_auth_token(username, password),
        );

        let response = self
            .call("auth.getMobileSession", RequestMode::Read, params, None)
            .await?;

        if !response.status {
            let (code, message) = response.error();
            warn!("Last.fm login rejected (code {:?}): {}", code, message);
            return Err(LastFmError::Auth { code, message });
        }

        let key = response
            .text("session/key")
            .ok_or_else(|| LastFmError::protocol("auth.getMobileSession: missing session/key"))?;

        debug!("Login successful for {}", username);

        Ok(Session {
            username: response
                .text("session/name")
                .unwrap_or_else(|| username.to_string()),
            key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_auth_token() {
        // md5("password") = 5f4dcc3b5aa765d61d8327deb882cf99
        let expected = md5_hex("rj5f4dcc3b5aa765d61d8327deb882cf99");
        assert_eq!(mobile_auth_token("rj", "password"), expected);
        assert_eq!(expected.len(), 32);
    }
}
