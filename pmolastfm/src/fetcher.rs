//! Téléchargement des pistes avec suivi des redirections
//!
//! Les URL de lecture de la playlist redirigent vers l'hôte qui sert réellement
//! le fichier. Les redirections sont suivies par une boucle bornée (la politique
//! de redirection de reqwest est désactivée) et le corps est relayé morceau par
//! morceau vers un [`ChunkSink`], sans jamais être chargé entièrement en mémoire.

use crate::error::{LastFmError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::header::{ACCEPT, LOCATION};
use reqwest::{Client, redirect};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

/// Nombre maximum de redirections suivies par défaut
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Timeout par défaut d'un téléchargement complet
pub const DEFAULT_TRACK_TIMEOUT_SECS: u64 = 7200;

/// Timeout de connexion à l'hôte des médias
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Destination des morceaux relayés
#[async_trait]
pub trait ChunkSink: Send {
    /// Accepte le morceau suivant
    async fn accept(&mut self, chunk: Bytes) -> std::io::Result<()>;
}

/// Adapte n'importe quel writer tokio en [`ChunkSink`]
///
/// Chaque morceau est écrit entièrement puis vidé, pour que l'auditeur reçoive
/// les octets au fil de l'eau.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ChunkSink for WriterSink<W> {
    async fn accept(&mut self, chunk: Bytes) -> std::io::Result<()> {
        self.writer.write_all(&chunk).await?;
        self.writer.flush().await
    }
}

/// Issue d'un téléchargement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Tout le corps a été relayé
    Completed { bytes: u64 },
    /// Interrompu par une demande d'arrêt
    Cancelled { bytes: u64 },
}

impl FetchOutcome {
    /// Octets effectivement écrits dans le sink
    pub fn bytes(&self) -> u64 {
        match self {
            FetchOutcome::Completed { bytes } | FetchOutcome::Cancelled { bytes } => *bytes,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchOutcome::Cancelled { .. })
    }
}

/// Client de téléchargement des pistes
#[derive(Debug, Clone)]
pub struct TrackFetcher {
    client: Client,
    max_redirects: usize,
    track_timeout: Duration,
}

impl TrackFetcher {
    /// Crée un fetcher avec les valeurs par défaut
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::api::DEFAULT_USER_AGENT)
            .redirect(redirect::Policy::none())
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self::with_client(client))
    }

    /// Utilise un client existant
    ///
    /// Le client doit avoir la politique de redirection `none`, sinon les
    /// redirections sont suivies par reqwest et la limite n'est plus appliquée.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            track_timeout: Duration::from_secs(DEFAULT_TRACK_TIMEOUT_SECS),
        }
    }

    /// Change le nombre maximum de redirections
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Change le timeout d'un téléchargement complet
    pub fn track_timeout(mut self, timeout: Duration) -> Self {
        self.track_timeout = timeout;
        self
    }

    /// Télécharge `url` en relayant le corps dans `sink`
    ///
    /// # Errors
    ///
    /// * `LastFmError::RedirectLoop` - Plus de `max_redirects` redirections
    /// * `LastFmError::Upstream` - Statut ni succès ni redirection, ou redirection sans `Location`
    /// * `LastFmError::Transport` - Échec réseau, y compris au milieu du corps
    /// * `LastFmError::Downstream` - Le sink a refusé un morceau
    ///
    /// Une annulation n'est pas une erreur : elle donne [`FetchOutcome::Cancelled`].
    pub async fn fetch_into<S>(
        &self,
        url: &str,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome>
    where
        S: ChunkSink + ?Sized,
    {
        let mut current = Url::parse(url)?;
        let mut remaining = self.max_redirects;

        loop {
            if cancel.is_cancelled() {
                return Ok(FetchOutcome::Cancelled { bytes: 0 });
            }

            debug!("Fetching from {}", current);

            let request = self
                .client
                .get(current.clone())
                .header(ACCEPT, "audio/*")
                .timeout(self.track_timeout)
                .send();

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(FetchOutcome::Cancelled { bytes: 0 }),
                response = request => response?,
            };

            let status = response.status();

            if status.is_redirection() {
                if remaining == 0 {
                    return Err(LastFmError::RedirectLoop {
                        url: url.to_string(),
                        max: self.max_redirects,
                    });
                }
                remaining -= 1;

                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| LastFmError::Upstream {
                        url: current.to_string(),
                        status: status.as_u16(),
                    })?;

                // Les Location relatives sont résolues par rapport à l'URL courante
                let next = current.join(location)?;
                debug!("HTTP {} redirect to {}", status.as_u16(), next);
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(LastFmError::Upstream {
                    url: current.to_string(),
                    status: status.as_u16(),
                });
            }

            return relay_stream(response.bytes_stream(), sink, cancel).await;
        }
    }
}

/// Relaye un flux de morceaux vers un sink en respectant l'annulation
///
/// L'annulation est vérifiée pendant l'attente de chaque morceau et juste après
/// chaque écriture : une fois demandée, plus aucun morceau n'atteint le sink et
/// le flux amont est abandonné (ce qui ferme la connexion).
pub async fn relay_stream<St, E, S>(
    stream: St,
    sink: &mut S,
    cancel: &CancellationToken,
) -> Result<FetchOutcome>
where
    St: Stream<Item = std::result::Result<Bytes, E>>,
    LastFmError: From<E>,
    S: ChunkSink + ?Sized,
{
    let mut stream = std::pin::pin!(stream);
    let mut written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(FetchOutcome::Cancelled { bytes: written }),
            next = stream.next() => next,
        };

        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;
        let len = chunk.len() as u64;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(FetchOutcome::Cancelled { bytes: written }),
            result = sink.accept(chunk) => result.map_err(LastFmError::Downstream)?,
        }
        written += len;
        trace!("{} bytes relayed", written);

        if cancel.is_cancelled() {
            return Ok(FetchOutcome::Cancelled { bytes: written });
        }
    }

    Ok(FetchOutcome::Completed { bytes: written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    /// Sink qui enregistre les morceaux et peut déclencher l'annulation
    struct RecordingSink {
        chunks: Vec<Bytes>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    #[async_trait]
    impl ChunkSink for RecordingSink {
        async fn accept(&mut self, chunk: Bytes) -> std::io::Result<()> {
            self.chunks.push(chunk);
            if let Some((k, token)) = &self.cancel_after {
                if self.chunks.len() == *k {
                    token.cancel();
                }
            }
            Ok(())
        }
    }

    fn chunks(n: usize) -> Vec<std::result::Result<Bytes, LastFmError>> {
        (0..n)
            .map(|i| Ok(Bytes::from(format!("chunk-{i};"))))
            .collect()
    }

    #[tokio::test]
    async fn test_relay_stream_delivers_all_chunks_in_order() {
        let cancel = CancellationToken::new();
        let mut sink = RecordingSink {
            chunks: Vec::new(),
            cancel_after: None,
        };

        let outcome = relay_stream(stream::iter(chunks(5)), &mut sink, &cancel)
            .await
            .unwrap();

        let joined: Vec<u8> = sink.chunks.iter().flat_map(|c| c.to_vec()).collect();
        assert_eq!(
            String::from_utf8(joined).unwrap(),
            "chunk-0;chunk-1;chunk-2;chunk-3;chunk-4;"
        );
        assert_eq!(outcome, FetchOutcome::Completed { bytes: 40 });
    }

    #[tokio::test]
    async fn test_cancellation_stops_after_current_chunk() {
        for k in 1..=4 {
            let cancel = CancellationToken::new();
            let mut sink = RecordingSink {
                chunks: Vec::new(),
                cancel_after: Some((k, cancel.clone())),
            };

            let outcome = relay_stream(stream::iter(chunks(10)), &mut sink, &cancel)
                .await
                .unwrap();

            assert!(outcome.is_cancelled());
            assert_eq!(sink.chunks.len(), k, "no chunk may follow the cancellation");
            assert_eq!(outcome.bytes(), 8 * k as u64);
        }
    }

    #[tokio::test]
    async fn test_already_cancelled_writes_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink = RecordingSink {
            chunks: Vec::new(),
            cancel_after: None,
        };

        let outcome = relay_stream(stream::iter(chunks(3)), &mut sink, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Cancelled { bytes: 0 });
        assert!(sink.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_stream_error_is_reported() {
        let cancel = CancellationToken::new();
        let mut sink = RecordingSink {
            chunks: Vec::new(),
            cancel_after: None,
        };
        let items = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(LastFmError::Protocol("broken body".to_string())),
            Ok(Bytes::from_static(b"def")),
        ];

        let err = relay_stream(stream::iter(items), &mut sink, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, LastFmError::Protocol(_)));
        assert_eq!(sink.chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_writer_sink_writes_through() {
        let mut sink = WriterSink::new(Vec::new());
        sink.accept(Bytes::from_static(b"ID3")).await.unwrap();
        sink.accept(Bytes::from_static(b"\x04\x00")).await.unwrap();
        assert_eq!(sink.into_inner(), b"ID3\x04\x00".to_vec());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let fetcher = TrackFetcher::new().unwrap();
        let mut sink = WriterSink::new(Vec::new());
        let err = fetcher
            .fetch_into("not a url", &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LastFmError::InvalidUrl(_)));
    }
}
