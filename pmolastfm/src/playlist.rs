//! File d'attente des pistes à venir pour une station
//!
//! Le [`PlaylistBuffer`] garde toujours au moins deux pistes d'avance quand le
//! service en fournit : dès que la file descend sous ce seuil, un nouveau lot
//! est demandé avec le dernier curseur `(rtp, discovery)` utilisé.

use crate::api::LastFmApi;
use crate::error::Result;
use crate::models::{PlaylistBatch, PlaylistCursor, Session, StationInfo, Track};
use async_trait::async_trait;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Nombre de pistes gardées d'avance
pub const LOOKAHEAD: usize = 2;

/// Source des lots de pistes d'une station
#[async_trait]
pub trait PlaylistProvider: Send + Sync {
    /// Active la station
    async fn tune(&self, station: &str) -> Result<StationInfo>;

    /// Récupère le lot suivant
    async fn fetch_playlist(&self, cursor: &PlaylistCursor) -> Result<PlaylistBatch>;
}

/// Fournisseur adossé à l'API Last.fm et à une session authentifiée
#[derive(Debug, Clone)]
pub struct RadioClient {
    api: LastFmApi,
    session: Session,
}

impl RadioClient {
    pub fn new(api: LastFmApi, session: Session) -> Self {
        Self { api, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

#[async_trait]
impl PlaylistProvider for RadioClient {
    async fn tune(&self, station: &str) -> Result<StationInfo> {
        self.api.radio_tune(&self.session, station).await
    }

    async fn fetch_playlist(&self, cursor: &PlaylistCursor) -> Result<PlaylistBatch> {
        self.api.radio_get_playlist(&self.session, cursor).await
    }
}

/// Résultat de [`PlaylistBuffer::next`]
#[derive(Debug, Clone, PartialEq)]
pub enum Upcoming {
    /// Piste suivante, dans l'ordre renvoyé par le service
    Track(Track),
    /// Le service n'a plus rien à proposer
    EndOfStream,
}

/// File FIFO des pistes d'une station, propriété exclusive d'une session
pub struct PlaylistBuffer<P> {
    provider: P,
    queue: VecDeque<Track>,
    cursor: PlaylistCursor,
    station: Option<String>,
    station_info: StationInfo,
    title: Option<String>,
    refills: usize,
}

impl<P: PlaylistProvider> PlaylistBuffer<P> {
    /// Crée une file vide avec le curseur initial
    pub fn new(provider: P, cursor: PlaylistCursor) -> Self {
        Self {
            provider,
            queue: VecDeque::new(),
            cursor,
            station: None,
            station_info: StationInfo::default(),
            title: None,
            refills: 0,
        }
    }

    /// Active une station
    ///
    /// Le titre affiché devient le nom renvoyé par le service, ou à défaut
    /// l'identifiant de la station.
    pub async fn tune(&mut self, station: &str) -> Result<StationInfo> {
        let info = self.provider.tune(station).await?;

        self.title = Some(info.name.clone().unwrap_or_else(|| station.to_string()));
        self.station = Some(station.to_string());
        self.station_info = info.clone();

        info!("Tuned to station {:?}", self.title());
        Ok(info)
    }

    /// Recharge la file si elle contient moins de [`LOOKAHEAD`] pistes
    ///
    /// # Returns
    ///
    /// Le nombre de pistes en file après l'éventuel rechargement
    pub async fn ensure_ahead(&mut self) -> Result<usize> {
        if self.queue.len() < LOOKAHEAD {
            self.refill().await?;
        }
        Ok(self.queue.len())
    }

    /// Retire la piste en tête de file
    ///
    /// Renvoie [`Upcoming::EndOfStream`] si la file est toujours vide après
    /// une tentative de rechargement ; les erreurs d'API restent des erreurs.
    pub async fn next(&mut self) -> Result<Upcoming> {
        self.ensure_ahead().await?;

        Ok(match self.queue.pop_front() {
            Some(track) => Upcoming::Track(track),
            None => Upcoming::EndOfStream,
        })
    }

    async fn refill(&mut self) -> Result<()> {
        debug!(
            "Fetching new tracks ({} queued, rtp={}, discovery={})",
            self.queue.len(),
            self.cursor.rtp,
            self.cursor.discovery
        );

        let batch = self.provider.fetch_playlist(&self.cursor).await?;

        self.refills += 1;
        if let Some(title) = batch.title {
            self.title = Some(title);
        }
        self.queue.extend(batch.tracks);

        debug!("{} tracks queued after refill", self.queue.len());
        Ok(())
    }

    /// Titre affichable de la station
    pub fn title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.station.as_deref())
            .unwrap_or_default()
    }

    /// Identifiant de la station active
    pub fn station(&self) -> Option<&str> {
        self.station.as_deref()
    }

    /// Informations renvoyées par le dernier `tune`
    pub fn station_info(&self) -> &StationInfo {
        &self.station_info
    }

    /// Curseur utilisé pour le prochain rechargement
    pub fn cursor(&self) -> &PlaylistCursor {
        &self.cursor
    }

    /// Nombre de pistes en attente
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Nombre de rechargements réussis depuis la création
    pub fn refills(&self) -> usize {
        self.refills
    }
}
