//! Extension pour intégrer la configuration Last.fm dans pmoconfig
//!
//! Ce module fournit le trait `LastFmConfigExt` qui ajoute à
//! `pmoconfig::Config` les getters des credentials Last.fm et des paramètres
//! de la radio, ainsi que des constructeurs `from_config` pour le client API,
//! le fetcher et le relais.

use crate::api::{DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT_SECS, LastFmApi};
use crate::fetcher::{DEFAULT_MAX_REDIRECTS, DEFAULT_TRACK_TIMEOUT_SECS, TrackFetcher};
use crate::models::{ApiCredentials, PlaylistCursor};
use crate::preamble::DEFAULT_BITRATE;
use crate::relay::{DEFAULT_MAX_CONSECUTIVE_FAILURES, RadioRelay, RelaySettings};
use anyhow::{Result, anyhow};
use pmoconfig::Config;
use serde_yaml::Value;
use std::time::Duration;

/// Trait d'extension pour gérer la configuration Last.fm dans pmoconfig
///
/// # Exemple
///
/// ```rust,ignore
/// use pmoconfig::get_config;
/// use pmolastfm::LastFmConfigExt;
///
/// let config = get_config();
/// let (username, _password) = config.get_lastfm_credentials()?;
/// println!("Last.fm user: {}", username);
/// ```
pub trait LastFmConfigExt {
    /// Nom d'utilisateur Last.fm
    ///
    /// # Errors
    ///
    /// Retourne une erreur si le nom d'utilisateur n'est pas configuré
    fn get_lastfm_username(&self) -> Result<String>;

    fn set_lastfm_username(&self, username: &str) -> Result<()>;

    /// Mot de passe Last.fm, déchiffré s'il est stocké sous forme `encrypted:`
    fn get_lastfm_password(&self) -> Result<String>;

    fn set_lastfm_password(&self, password: &str) -> Result<()>;

    /// Récupère le couple (username, password)
    fn get_lastfm_credentials(&self) -> Result<(String, String)>;

    /// Clé et secret de l'application (le secret peut être chiffré)
    fn get_lastfm_api_credentials(&self) -> Result<ApiCredentials>;

    /// URL du web service
    fn get_lastfm_api_url(&self) -> String;

    /// Timeout des appels API
    fn get_lastfm_request_timeout(&self) -> Duration;

    /// Station à relayer
    ///
    /// Par défaut, la station personnelle de l'utilisateur configuré.
    fn get_radio_station(&self) -> Result<String>;

    fn set_radio_station(&self, station: &str) -> Result<()>;

    /// Curseur `(rtp, discovery)` envoyé à chaque `radio.getPlaylist`
    fn get_radio_cursor(&self) -> PlaylistCursor;

    /// Débit nominal annoncé au lecteur
    fn get_radio_bitrate(&self) -> u32;

    /// Nombre maximum de redirections par piste
    fn get_radio_max_redirects(&self) -> usize;

    /// Pistes en échec tolérées d'affilée
    fn get_radio_max_consecutive_failures(&self) -> usize;

    /// Timeout d'un téléchargement complet
    fn get_radio_track_timeout(&self) -> Duration;

    /// Paramètres complets d'une session de relais
    fn get_relay_settings(&self) -> Result<RelaySettings>;
}

impl LastFmConfigExt for Config {
    fn get_lastfm_username(&self) -> Result<String> {
        match self.get_value(&["accounts", "lastfm", "username"]) {
            Ok(Value::String(s)) if !s.is_empty() => Ok(s),
            _ => Err(anyhow!("Last.fm username not configured")),
        }
    }

    fn set_lastfm_username(&self, username: &str) -> Result<()> {
        self.set_value(
            &["accounts", "lastfm", "username"],
            Value::String(username.to_string()),
        )
    }

    fn get_lastfm_password(&self) -> Result<String> {
        match self.get_value(&["accounts", "lastfm", "password"]) {
            Ok(Value::String(s)) if !s.is_empty() => pmoconfig::encryption::get_password(&s)
                .map_err(|e| anyhow!("Failed to decrypt Last.fm password: {}", e)),
            _ => Err(anyhow!("Last.fm password not configured")),
        }
    }

    fn set_lastfm_password(&self, password: &str) -> Result<()> {
        self.set_value(
            &["accounts", "lastfm", "password"],
            Value::String(password.to_string()),
        )
    }

    fn get_lastfm_credentials(&self) -> Result<(String, String)> {
        let username = self.get_lastfm_username()?;
        let password = self.get_lastfm_password()?;
        Ok((username, password))
    }

    fn get_lastfm_api_credentials(&self) -> Result<ApiCredentials> {
        let api_key = match self.get_value(&["accounts", "lastfm", "api_key"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => return Err(anyhow!("Last.fm API key not configured")),
        };
        let api_secret = match self.get_value(&["accounts", "lastfm", "api_secret"]) {
            Ok(Value::String(s)) if !s.is_empty() => pmoconfig::encryption::get_password(&s)
                .map_err(|e| anyhow!("Failed to decrypt Last.fm API secret: {}", e))?,
            _ => return Err(anyhow!("Last.fm API secret not configured")),
        };
        Ok(ApiCredentials::new(api_key, api_secret))
    }

    fn get_lastfm_api_url(&self) -> String {
        match self.get_value(&["accounts", "lastfm", "api_url"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => DEFAULT_API_URL.to_string(),
        }
    }

    fn get_lastfm_request_timeout(&self) -> Duration {
        Duration::from_secs(
            u64_value(self, &["radio", "request_timeout_secs"])
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    fn get_radio_station(&self) -> Result<String> {
        match self.get_value(&["radio", "station"]) {
            Ok(Value::String(s)) if !s.is_empty() => Ok(s),
            _ => Ok(RelaySettings::personal_station(
                &self.get_lastfm_username()?,
            )),
        }
    }

    fn set_radio_station(&self, station: &str) -> Result<()> {
        self.set_value(&["radio", "station"], Value::String(station.to_string()))
    }

    fn get_radio_cursor(&self) -> PlaylistCursor {
        let rtp = flag_value(self, &["radio", "rtp"]).unwrap_or_else(|| "0".to_string());
        let discovery =
            flag_value(self, &["radio", "discovery"]).unwrap_or_else(|| "0".to_string());
        PlaylistCursor::new(rtp, discovery)
    }

    fn get_radio_bitrate(&self) -> u32 {
        u64_value(self, &["radio", "bitrate"])
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(DEFAULT_BITRATE)
    }

    fn get_radio_max_redirects(&self) -> usize {
        u64_value(self, &["radio", "max_redirects"])
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_REDIRECTS)
    }

    fn get_radio_max_consecutive_failures(&self) -> usize {
        u64_value(self, &["radio", "max_consecutive_failures"])
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES)
    }

    fn get_radio_track_timeout(&self) -> Duration {
        Duration::from_secs(
            u64_value(self, &["radio", "track_timeout_secs"]).unwrap_or(DEFAULT_TRACK_TIMEOUT_SECS),
        )
    }

    fn get_relay_settings(&self) -> Result<RelaySettings> {
        Ok(RelaySettings {
            station: self.get_radio_station()?,
            cursor: self.get_radio_cursor(),
            bitrate: self.get_radio_bitrate(),
            max_consecutive_failures: self.get_radio_max_consecutive_failures(),
        })
    }
}

fn u64_value(config: &Config, path: &[&str]) -> Option<u64> {
    match config.get_value(path).ok()? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Les drapeaux `rtp`/`discovery` sont transmis tels quels : "0"/"1"
fn flag_value(config: &Config, path: &[&str]) -> Option<String> {
    match config.get_value(path).ok()? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

impl LastFmApi {
    /// Crée un client API depuis la configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let api = LastFmApi::builder(config.get_lastfm_api_credentials()?)
            .api_url(config.get_lastfm_api_url())
            .timeout(config.get_lastfm_request_timeout())
            .build()?;
        Ok(api)
    }
}

impl TrackFetcher {
    /// Crée un fetcher depuis la configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(TrackFetcher::new()?
            .max_redirects(config.get_radio_max_redirects())
            .track_timeout(config.get_radio_track_timeout()))
    }
}

impl RadioRelay {
    /// Authentifie l'utilisateur configuré et construit le relais
    ///
    /// # Errors
    ///
    /// Retourne une erreur si un paramètre obligatoire manque ou si
    /// l'authentification échoue.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let api = LastFmApi::from_config(config)?;
        let fetcher = TrackFetcher::from_config(config)?;
        let settings = config.get_relay_settings()?;
        let (username, password) = config.get_lastfm_credentials()?;

        Ok(RadioRelay::login(api, &username, &password, fetcher, settings).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_defaults() {
        let (_dir, config) = config();

        assert!(config.get_lastfm_username().is_err());
        assert_eq!(config.get_lastfm_api_url(), DEFAULT_API_URL);
        assert_eq!(config.get_radio_cursor(), PlaylistCursor::new("0", "0"));
        assert_eq!(config.get_radio_bitrate(), 128);
        assert_eq!(config.get_radio_max_redirects(), 10);
        assert_eq!(config.get_radio_max_consecutive_failures(), 5);
        assert_eq!(config.get_lastfm_request_timeout(), Duration::from_secs(30));
        assert_eq!(config.get_radio_track_timeout(), Duration::from_secs(7200));
    }

    #[test]
    fn test_station_defaults_to_personal() {
        let (_dir, config) = config();
        config.set_lastfm_username("rj").unwrap();

        assert_eq!(
            config.get_radio_station().unwrap(),
            "lastfm://user/rj/personal"
        );

        config
            .set_radio_station("lastfm://globaltags/jazz")
            .unwrap();
        assert_eq!(
            config.get_radio_station().unwrap(),
            "lastfm://globaltags/jazz"
        );
    }

    #[test]
    fn test_credentials() {
        let (_dir, config) = config();
        config.set_lastfm_username("rj").unwrap();
        config.set_lastfm_password("hunter2").unwrap();
        config
            .set_value(
                &["accounts", "lastfm", "api_key"],
                Value::String("key".to_string()),
            )
            .unwrap();
        config
            .set_value(
                &["accounts", "lastfm", "api_secret"],
                Value::String("secret".to_string()),
            )
            .unwrap();

        let (username, password) = config.get_lastfm_credentials().unwrap();
        assert_eq!(username, "rj");
        assert_eq!(password, "hunter2");

        let creds = config.get_lastfm_api_credentials().unwrap();
        assert_eq!(creds.api_key, "key");
        assert_eq!(creds.api_secret, "secret");
    }

    #[test]
    fn test_cursor_accepts_numbers_and_bools() {
        let (_dir, config) = config();
        config
            .set_value(&["radio", "rtp"], Value::Number(1.into()))
            .unwrap();
        config
            .set_value(&["radio", "discovery"], Value::Bool(true))
            .unwrap();

        assert_eq!(config.get_radio_cursor(), PlaylistCursor::new("1", "1"));
    }

    #[test]
    fn test_relay_settings() {
        let (_dir, config) = config();
        config.set_lastfm_username("rj").unwrap();
        config
            .set_value(&["radio", "bitrate"], Value::Number(192.into()))
            .unwrap();

        let settings = config.get_relay_settings().unwrap();
        assert_eq!(settings.station, "lastfm://user/rj/personal");
        assert_eq!(settings.bitrate, 192);
        assert_eq!(settings.max_consecutive_failures, 5);
    }
}
