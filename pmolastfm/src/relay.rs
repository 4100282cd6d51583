//! Relais radio : d'une station Last.fm vers un auditeur
//!
//! Une [`RelaySession`] occupe une tâche pour toute la durée d'une connexion :
//!
//! ```text
//! Idle → Tuning → Streaming ⇄ Draining → ShuttingDown → Closed
//!                                 (Error depuis n'importe quel état)
//! ```
//!
//! Les pistes sont relayées une par une, dans l'ordre de la playlist ; seules
//! les métadonnées sont préchargées. Une demande d'arrêt interrompt le
//! téléchargement en cours à la granularité d'un morceau.

use crate::api::LastFmApi;
use crate::error::Result;
use crate::fetcher::{ChunkSink, FetchOutcome, TrackFetcher, WriterSink};
use crate::models::{PlaylistCursor, Session};
use crate::playlist::{PlaylistBuffer, PlaylistProvider, RadioClient, Upcoming};
use crate::preamble::{DEFAULT_BITRATE, StreamPreamble};
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Nombre de pistes en échec consécutives avant d'abandonner la session
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 5;

/// Paramètres d'une session de relais
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Station à écouter (`lastfm://user/NAME/personal`…)
    pub station: String,
    /// Curseur initial de la playlist
    pub cursor: PlaylistCursor,
    /// Débit nominal annoncé à l'auditeur
    pub bitrate: u32,
    /// Pistes en échec tolérées d'affilée
    pub max_consecutive_failures: usize,
}

impl RelaySettings {
    pub fn new(station: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            cursor: PlaylistCursor::default(),
            bitrate: DEFAULT_BITRATE,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }

    /// Station personnelle d'un utilisateur
    pub fn personal_station(username: &str) -> String {
        format!("lastfm://user/{username}/personal")
    }
}

/// État de la machine à états d'une session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Tuning,
    Streaming,
    Draining,
    ShuttingDown,
    Closed,
    Error,
}

impl RelayState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayState::Closed | RelayState::Error)
    }
}

/// Compteurs d'une session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Pistes relayées jusqu'au bout
    pub tracks_played: usize,
    /// Pistes abandonnées sur erreur
    pub tracks_skipped: usize,
    /// Octets audio écrits vers l'auditeur (hors préambule)
    pub bytes_forwarded: u64,
}

/// Session de relais pour une connexion descendante
pub struct RelaySession<P> {
    playlist: PlaylistBuffer<P>,
    fetcher: TrackFetcher,
    station: String,
    bitrate: u32,
    max_consecutive_failures: usize,
    shutdown: CancellationToken,
    state: RelayState,
    stats: RelayStats,
}

impl<P: PlaylistProvider> RelaySession<P> {
    pub fn new(
        provider: P,
        fetcher: TrackFetcher,
        settings: &RelaySettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            playlist: PlaylistBuffer::new(provider, settings.cursor.clone()),
            fetcher,
            station: settings.station.clone(),
            bitrate: settings.bitrate,
            max_consecutive_failures: settings.max_consecutive_failures,
            shutdown,
            state: RelayState::Idle,
            stats: RelayStats::default(),
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Jeton d'arrêt observé par la session
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Demande l'arrêt de la session
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Déroule la session jusqu'à un état terminal
    ///
    /// La connexion descendante est fermée une seule fois, quelle que soit
    /// l'issue. Les erreurs de démarrage (tune, premier lot) sont renvoyées
    /// sans qu'aucun octet n'ait été écrit.
    pub async fn run<W>(&mut self, downstream: W) -> Result<RelayStats>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut sink = WriterSink::new(downstream);

        if self.state.is_terminal() {
            warn!("Relay session already finished ({:?})", self.state);
            close_downstream(&mut sink).await;
            return Ok(self.stats);
        }

        let result = self.drive(&mut sink).await;
        close_downstream(&mut sink).await;

        match result {
            Ok(()) => {
                self.transition(RelayState::Closed);
                info!(
                    "Relay session closed: {} tracks played, {} skipped, {} bytes",
                    self.stats.tracks_played, self.stats.tracks_skipped, self.stats.bytes_forwarded
                );
                Ok(self.stats)
            }
            Err(e) => {
                self.transition(RelayState::Error);
                error!("Relay session failed: {}", e);
                Err(e)
            }
        }
    }

    async fn drive<W>(&mut self, sink: &mut WriterSink<W>) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.transition(RelayState::Tuning);

        let shutdown = self.shutdown.clone();
        let startup = async {
            let info = self.playlist.tune(&self.station).await?;
            let ahead = self.playlist.ensure_ahead().await?;
            Ok::<_, crate::error::LastFmError>((info, ahead))
        };
        let started = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            startup = startup => Some(startup),
        };
        let Some(started) = started else {
            self.transition(RelayState::ShuttingDown);
            return Ok(());
        };
        let (info, ahead) = started?;

        if ahead == 0 {
            info!("Station {} has no tracks, quitting", self.station);
            return Ok(());
        }

        let preamble = StreamPreamble::new(
            self.playlist.title(),
            info.url.as_deref().unwrap_or(&self.station),
            self.bitrate,
        );
        if let Err(e) = sink.accept(Bytes::from(preamble.render())).await {
            info!("Listener went away before streaming started: {}", e);
            return Ok(());
        }

        info!("Streaming {:?} to listener", self.playlist.title());
        self.transition(RelayState::Streaming);

        let mut consecutive_failures = 0;
        loop {
            if self.shutdown.is_cancelled() {
                self.transition(RelayState::ShuttingDown);
                return Ok(());
            }

            let upcoming = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                upcoming = self.playlist.next() => Some(upcoming),
            };

            let track = match upcoming.transpose()? {
                None => {
                    self.transition(RelayState::ShuttingDown);
                    return Ok(());
                }
                Some(Upcoming::Track(track)) => track,
                Some(Upcoming::EndOfStream) => {
                    info!("No more tracks, quitting");
                    return Ok(());
                }
            };

            self.transition(RelayState::Draining);
            info!("Playing: {}", track.display_name());

            match self
                .fetcher
                .fetch_into(&track.location, sink, &self.shutdown)
                .await
            {
                Ok(FetchOutcome::Completed { bytes }) => {
                    consecutive_failures = 0;
                    self.stats.tracks_played += 1;
                    self.stats.bytes_forwarded += bytes;
                    info!("{} bytes relayed for {}", bytes, track.display_name());
                }
                Ok(FetchOutcome::Cancelled { bytes }) => {
                    self.stats.bytes_forwarded += bytes;
                    info!("Transfer interrupted after {} bytes", bytes);
                    self.transition(RelayState::ShuttingDown);
                    return Ok(());
                }
                Err(e) if e.is_downstream() => {
                    info!("Listener disconnected: {}", e);
                    return Ok(());
                }
                Err(e) if e.is_track_local() => {
                    consecutive_failures += 1;
                    self.stats.tracks_skipped += 1;
                    warn!("Skipping {}: {}", track.display_name(), e);

                    if consecutive_failures > self.max_consecutive_failures {
                        error!("{} tracks failed in a row, giving up", consecutive_failures);
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }

            self.transition(RelayState::Streaming);
        }
    }

    fn transition(&mut self, next: RelayState) {
        if self.state != next {
            debug!("Relay state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

async fn close_downstream<W>(sink: &mut WriterSink<W>)
where
    W: AsyncWrite + Unpin + Send,
{
    if let Err(e) = sink.get_mut().shutdown().await {
        debug!("Downstream shutdown failed: {}", e);
    }
}

/// Relais authentifié, partagé par toutes les connexions
///
/// Porte la session Last.fm (immuable après l'authentification), le client API
/// et le fetcher ; chaque connexion obtient sa propre [`RelaySession`].
#[derive(Debug, Clone)]
pub struct RadioRelay {
    api: LastFmApi,
    session: Session,
    fetcher: TrackFetcher,
    settings: RelaySettings,
}

impl RadioRelay {
    pub fn new(
        api: LastFmApi,
        session: Session,
        fetcher: TrackFetcher,
        settings: RelaySettings,
    ) -> Self {
        Self {
            api,
            session,
            fetcher,
            settings,
        }
    }

    /// Authentifie puis construit le relais
    ///
    /// # Errors
    ///
    /// * `LastFmError::Auth` - Credentials refusés : le relais ne peut pas démarrer
    pub async fn login(
        api: LastFmApi,
        username: &str,
        password: &str,
        fetcher: TrackFetcher,
        settings: RelaySettings,
    ) -> Result<Self> {
        let session = api.authenticate(username, password).await?;
        info!("Authenticated as {}", session.username);
        Ok(Self::new(api, session, fetcher, settings))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Crée une session pour une nouvelle connexion
    pub fn create_session(&self, shutdown: CancellationToken) -> RelaySession<RadioClient> {
        RelaySession::new(
            RadioClient::new(self.api.clone(), self.session.clone()),
            self.fetcher.clone(),
            &self.settings,
            shutdown,
        )
    }

    /// Relaye la station vers `downstream` jusqu'à la fin du flux ou l'arrêt
    pub async fn serve<W>(&self, downstream: W, shutdown: CancellationToken) -> Result<RelayStats>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.create_session(shutdown).run(downstream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LastFmError;
    use crate::models::{PlaylistBatch, StationInfo};
    use async_trait::async_trait;

    struct FailingProvider;

    #[async_trait]
    impl PlaylistProvider for FailingProvider {
        async fn tune(&self, _station: &str) -> Result<StationInfo> {
            Err(LastFmError::Api {
                method: "radio.tune".to_string(),
                code: Some(4),
                message: "Invalid authentication token".to_string(),
            })
        }

        async fn fetch_playlist(&self, _cursor: &PlaylistCursor) -> Result<PlaylistBatch> {
            Ok(PlaylistBatch::default())
        }
    }

    struct EmptyProvider;

    #[async_trait]
    impl PlaylistProvider for EmptyProvider {
        async fn tune(&self, station: &str) -> Result<StationInfo> {
            Ok(StationInfo {
                name: Some(station.to_uppercase()),
                ..StationInfo::default()
            })
        }

        async fn fetch_playlist(&self, _cursor: &PlaylistCursor) -> Result<PlaylistBatch> {
            Ok(PlaylistBatch::default())
        }
    }

    fn settings() -> RelaySettings {
        RelaySettings::new(RelaySettings::personal_station("rj"))
    }

    #[test]
    fn test_personal_station() {
        assert_eq!(
            RelaySettings::personal_station("rj"),
            "lastfm://user/rj/personal"
        );
        let s = settings();
        assert_eq!(s.bitrate, 128);
        assert_eq!(s.cursor, PlaylistCursor::default());
    }

    #[tokio::test]
    async fn test_tune_failure_writes_nothing() {
        let mut session = RelaySession::new(
            FailingProvider,
            TrackFetcher::new().unwrap(),
            &settings(),
            CancellationToken::new(),
        );
        let mut out = Vec::new();

        let err = session.run(&mut out).await.unwrap_err();

        assert!(matches!(err, LastFmError::Api { .. }));
        assert_eq!(session.state(), RelayState::Error);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_empty_station_closes_without_preamble() {
        let mut session = RelaySession::new(
            EmptyProvider,
            TrackFetcher::new().unwrap(),
            &settings(),
            CancellationToken::new(),
        );
        let mut out = Vec::new();

        let stats = session.run(&mut out).await.unwrap();

        assert_eq!(stats, RelayStats::default());
        assert_eq!(session.state(), RelayState::Closed);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let token = CancellationToken::new();
        let mut session = RelaySession::new(
            EmptyProvider,
            TrackFetcher::new().unwrap(),
            &settings(),
            token.clone(),
        );
        session.request_shutdown();
        assert!(token.is_cancelled());

        let mut out = Vec::new();
        session.run(&mut out).await.unwrap();
        assert_eq!(session.state(), RelayState::Closed);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_run_twice_is_a_no_op() {
        let mut session = RelaySession::new(
            EmptyProvider,
            TrackFetcher::new().unwrap(),
            &settings(),
            CancellationToken::new(),
        );
        let mut out = Vec::new();
        session.run(&mut out).await.unwrap();
        let stats = session.run(&mut out).await.unwrap();

        assert_eq!(stats, RelayStats::default());
        assert_eq!(session.state(), RelayState::Closed);
    }
}
