//! Appels radio : `radio.tune` et `radio.getPlaylist`

use super::{LastFmApi, Params};
use crate::error::{LastFmError, Result};
use crate::models::{PlaylistBatch, PlaylistCursor, RequestMode, Session, StationInfo};
use tracing::{debug, warn};

impl LastFmApi {
    /// Active une station pour les appels `radio.getPlaylist` suivants
    ///
    /// # Errors
    ///
    /// * `LastFmError::Api` - Le service a refusé la station
    pub async fn radio_tune(&self, session: &Session, station: &str) -> Result<StationInfo> {
        let mut params = Params::new();
        params.insert("station".to_string(), station.to_string());

        let response = self
            .call("radio.tune", RequestMode::Write, params, Some(session))
            .await?;
        if !response.status {
            return Err(api_error("radio.tune", &response));
        }

        let info = response
            .element("station")
            .map(StationInfo::from_element)
            .unwrap_or_default();

        debug!("Tuned to {} ({:?})", station, info.name);
        Ok(info)
    }

    /// Récupère le lot suivant de pistes pour la station active
    ///
    /// # Errors
    ///
    /// * `LastFmError::Api` - Statut d'échec (station non activée, session invalide…)
    pub async fn radio_get_playlist(
        &self,
        session: &Session,
        cursor: &PlaylistCursor,
    ) -> Result<PlaylistBatch> {
        let mut params = Params::new();
        params.insert("rtp".to_string(), cursor.rtp.clone());
        params.insert("discovery".to_string(), cursor.discovery.clone());

        let response = self
            .call("radio.getPlaylist", RequestMode::Read, params, Some(session))
            .await?;
        if !response.status {
            return Err(api_error("radio.getPlaylist", &response));
        }

        let batch = response
            .element("playlist")
            .map(PlaylistBatch::from_element)
            .unwrap_or_default();

        debug!("Fetched {} new tracks", batch.tracks.len());
        Ok(batch)
    }
}

fn api_error(method: &str, response: &super::ApiResponse) -> LastFmError {
    let (code, message) = response.error();
    warn!("Last.fm {} failed (code {:?}): {}", method, code, message);
    LastFmError::Api {
        method: method.to_string(),
        code,
        message,
    }
}
