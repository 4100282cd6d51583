//! Structures de données pour représenter les objets Last.fm

use crate::api::response::{children_named, element_text};
use std::fmt;
use xmltree::{Element, XMLNode};

/// Mode d'un appel API : lecture (GET) ou écriture (POST)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Read,
    Write,
}

/// Credentials de l'application auprès de l'API
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Session authentifiée, valable pour toute la durée du processus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Utilisateur pour lequel la session a été émise
    pub username: String,
    /// Clé de session (`sk`)
    pub key: String,
}

/// Informations sur une station, renvoyées par `radio.tune`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationInfo {
    /// Nom affichable de la station
    pub name: Option<String>,
    /// Type de station (`user`, `artist`, `tag`…)
    pub station_type: Option<String>,
    /// URL de la page de la station
    pub url: Option<String>,
    /// La station accepte le mode découverte
    pub supports_discovery: bool,
}

impl StationInfo {
    pub(crate) fn from_element(station: &Element) -> Self {
        let field = |name: &str| station.get_child(name).and_then(element_text);
        Self {
            name: field("name"),
            station_type: field("type"),
            url: field("url"),
            supports_discovery: field("supportsdiscovery").as_deref() == Some("1"),
        }
    }
}

/// Paramètres de continuation de playlist renvoyés à chaque `radio.getPlaylist`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistCursor {
    pub rtp: String,
    pub discovery: String,
}

impl PlaylistCursor {
    pub fn new(rtp: impl Into<String>, discovery: impl Into<String>) -> Self {
        Self {
            rtp: rtp.into(),
            discovery: discovery.into(),
        }
    }
}

impl Default for PlaylistCursor {
    fn default() -> Self {
        Self::new("0", "0")
    }
}

/// Représente une piste de la playlist radio
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// URL de lecture du média
    pub location: String,
    /// Titre de la piste
    pub title: Option<String>,
    /// Artiste
    pub creator: Option<String>,
    /// Album
    pub album: Option<String>,
    /// Durée en millisecondes
    pub duration: Option<u64>,
    /// URL de la pochette
    pub image: Option<String>,
    /// Identifiant de la piste côté service
    pub identifier: Option<String>,
    /// Page de l'artiste (livrée dans `<extension>`)
    pub artist_page: Option<String>,
    /// Page de la piste (livrée dans `<extension>`)
    pub track_page: Option<String>,
}

impl Track {
    /// Construit une piste depuis un élément `<track>` de la playlist XSPF
    ///
    /// Les enfants d'un élément `<extension>` sont aplatis dans le même espace
    /// de noms que les champs de premier niveau. Une piste sans `<location>`
    /// n'est pas jouable et est ignorée.
    pub(crate) fn from_element(track: &Element) -> Option<Self> {
        let mut fields = TrackFields::default();
        fields.collect(track);

        Some(Self {
            location: fields.location?,
            title: fields.title,
            creator: fields.creator,
            album: fields.album,
            duration: fields.duration.and_then(|d| d.parse().ok()),
            image: fields.image,
            identifier: fields.identifier,
            artist_page: fields.artist_page,
            track_page: fields.track_page,
        })
    }

    /// Libellé pour les logs : `artiste - titre`
    pub fn display_name(&self) -> String {
        match (&self.creator, &self.title) {
            (Some(artist), Some(title)) => format!("{artist} - {title}"),
            (None, Some(title)) => title.clone(),
            (Some(artist), None) => artist.clone(),
            (None, None) => self.location.clone(),
        }
    }
}

#[derive(Default)]
struct TrackFields {
    location: Option<String>,
    title: Option<String>,
    creator: Option<String>,
    album: Option<String>,
    duration: Option<String>,
    image: Option<String>,
    identifier: Option<String>,
    artist_page: Option<String>,
    track_page: Option<String>,
}

impl TrackFields {
    fn collect(&mut self, parent: &Element) {
        for node in &parent.children {
            let XMLNode::Element(child) = node else {
                continue;
            };

            if child.name == "extension" {
                self.collect(child);
                continue;
            }

            let slot = match child.name.as_str() {
                "location" => &mut self.location,
                "title" => &mut self.title,
                "creator" => &mut self.creator,
                "album" => &mut self.album,
                "duration" => &mut self.duration,
                "image" => &mut self.image,
                "identifier" => &mut self.identifier,
                "artistpage" => &mut self.artist_page,
                "trackpage" => &mut self.track_page,
                _ => continue,
            };

            // Premier arrivé, premier servi
            if slot.is_none() {
                *slot = element_text(child);
            }
        }
    }
}

/// Lot de pistes renvoyé par `radio.getPlaylist`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaylistBatch {
    /// Titre de la playlist, s'il est fourni
    pub title: Option<String>,
    /// Pistes dans l'ordre du document
    pub tracks: Vec<Track>,
}

impl PlaylistBatch {
    pub(crate) fn from_element(playlist: &Element) -> Self {
        let title = playlist.get_child("title").and_then(element_text);
        let tracks = playlist
            .get_child("trackList")
            .map(|list| {
                children_named(list, "track")
                    .filter_map(Track::from_element)
                    .collect()
            })
            .unwrap_or_default();

        Self { title, tracks }
    }
}
