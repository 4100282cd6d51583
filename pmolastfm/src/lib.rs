//! # pmolastfm - Radio personnelle Last.fm pour PMOMusic
//!
//! Cette crate implémente un relais de streaming : elle s'authentifie auprès du
//! service Last.fm, active une station, récupère les playlists au fil de l'eau et
//! renvoie le flux audio brut de chaque piste, l'une après l'autre, vers un
//! lecteur local connecté en HTTP.
//!
//! ## Vue d'ensemble
//!
//! - Requêtes signées vers l'API (`api_sig` MD5 sur les paramètres triés)
//! - Authentification mobile (`auth.getMobileSession`)
//! - Appels radio (`radio.tune`, `radio.getPlaylist`) avec une file de pistes
//!   gardant deux pistes d'avance
//! - Téléchargement des pistes avec un nombre borné de redirections
//! - Session de relais par connexion, interrompue proprement à l'arrêt
//!
//! ## Architecture
//!
//! - `api` : client signé et appels Last.fm
//! - `models` : session, station, pistes, curseur de playlist
//! - `playlist` : file des pistes à venir ([`PlaylistBuffer`])
//! - `fetcher` : téléchargement avec redirections ([`TrackFetcher`])
//! - `preamble` : en-tête envoyé au lecteur
//! - `relay` : machine à états d'une session ([`RelaySession`], [`RadioRelay`])
//! - `config_ext` : lecture des paramètres depuis `pmoconfig` (feature `pmoconfig`)
//! - `pmoserver_ext` : branchement sur l'accepteur `pmoserver` (feature `pmoserver`)
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use pmolastfm::{ApiCredentials, LastFmApi, RadioRelay, RelaySettings, TrackFetcher};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let api = LastFmApi::new(ApiCredentials::new("api-key", "api-secret"))?;
//!     let settings = RelaySettings::new(RelaySettings::personal_station("rj"));
//!     let relay = RadioRelay::login(api, "rj", "secret", TrackFetcher::new()?, settings).await?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:2000").await?;
//!     let (socket, _) = listener.accept().await?;
//!     let stats = relay.serve(socket, CancellationToken::new()).await?;
//!     println!("{} tracks played", stats.tracks_played);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod playlist;
pub mod preamble;
pub mod relay;

#[cfg(feature = "pmoconfig")]
pub mod config_ext;

#[cfg(feature = "pmoserver")]
pub mod pmoserver_ext;

pub use api::{LastFmApi, LastFmApiBuilder};
pub use error::{LastFmError, Result};
pub use fetcher::{ChunkSink, FetchOutcome, TrackFetcher, WriterSink};
pub use models::{
    ApiCredentials, PlaylistBatch, PlaylistCursor, RequestMode, Session, StationInfo, Track,
};
pub use playlist::{PlaylistBuffer, PlaylistProvider, RadioClient, Upcoming};
pub use preamble::StreamPreamble;
pub use relay::{RadioRelay, RelaySession, RelaySettings, RelayState, RelayStats};

#[cfg(feature = "pmoconfig")]
pub use config_ext::LastFmConfigExt;

#[cfg(feature = "pmoserver")]
pub use pmoserver_ext::LastFmServerExt;
