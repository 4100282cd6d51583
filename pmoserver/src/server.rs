//! # Module Server - Accepteur de connexions TCP
//!
//! Le serveur écoute sur un port, lit l'en-tête de requête du client (sans
//! l'interpréter) puis confie la socket au handler enregistré, dans une tâche
//! dédiée. Le nombre de sessions simultanées est borné ; au-delà, le client
//! reçoit un `503` et la connexion est fermée.
//!
//! - ⚡ **Arrêt gracieux** : un premier Ctrl+C annule toutes les sessions, un
//!   second termine le processus immédiatement.

use pmoconfig::get_config;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::{signal, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Taille maximale lue dans l'en-tête de requête
pub const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Délai maximal d'attente de l'en-tête de requête
pub const REQUEST_HEAD_TIMEOUT: Duration = Duration::from_secs(2);

/// Code de sortie après un second Ctrl+C
const FORCED_EXIT_CODE: i32 = 130;

const BUSY_RESPONSE: &[u8] =
    b"HTTP/1.0 503 Service Unavailable\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

const NO_HANDLER_RESPONSE: &[u8] =
    b"HTTP/1.0 404 Not Found\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handler de connexion : socket, adresse du client, jeton d'arrêt de la session
pub type ConnectionHandler =
    Arc<dyn Fn(TcpStream, SocketAddr, CancellationToken) -> BoxFuture + Send + Sync>;

/// Info serveur
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub http_port: u16,
    pub max_sessions: usize,
}

/// Serveur principal
pub struct Server {
    name: String,
    http_port: u16,
    max_sessions: usize,
    handler: Option<ConnectionHandler>,
    shutdown: CancellationToken,
    local_addr: Option<SocketAddr>,
    join_handle: Option<JoinHandle<()>>,
}

impl Server {
    /// Crée une nouvelle instance de serveur
    ///
    /// # Arguments
    ///
    /// * `name` - Nom du serveur (pour les logs)
    /// * `http_port` - Port à écouter (0 pour un port choisi par le système)
    /// * `max_sessions` - Nombre de sessions simultanées
    pub fn new(name: impl Into<String>, http_port: u16, max_sessions: usize) -> Self {
        Self {
            name: name.into(),
            http_port,
            max_sessions: max_sessions.max(1),
            handler: None,
            shutdown: CancellationToken::new(),
            local_addr: None,
            join_handle: None,
        }
    }

    pub fn new_configured() -> Self {
        ServerBuilder::new_configured().build()
    }

    /// Enregistre le handler appelé pour chaque connexion acceptée
    ///
    /// # Exemple
    ///
    /// ```rust,no_run
    /// # use pmoserver::Server;
    /// # use tokio::io::AsyncWriteExt;
    /// # #[tokio::main]
    /// # async fn main() -> anyhow::Result<()> {
    /// let mut server = Server::new("Echo", 2000, 1);
    /// server.set_handler(|mut socket, peer, _shutdown| async move {
    ///     let _ = socket.write_all(format!("hello {peer}\n").as_bytes()).await;
    /// });
    /// server.start().await?;
    /// server.wait().await;
    /// # Ok(())
    /// # }
    /// ```
    pub fn set_handler<F, Fut>(&mut self, handler: F)
    where
        F: Fn(TcpStream, SocketAddr, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |socket, peer, token| {
            Box::pin(handler(socket, peer, token)) as BoxFuture
        }));
    }

    /// Jeton d'arrêt du serveur ; chaque session reçoit un jeton enfant
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Adresse effectivement écoutée, une fois le serveur démarré
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Démarre l'écoute et la gestion de Ctrl+C
    ///
    /// # Errors
    ///
    /// Retourne une erreur si le port ne peut pas être ouvert.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        info!(
            "Server {} listening on {} (max {} session(s))",
            self.name, local_addr, self.max_sessions
        );

        let shutdown = self.shutdown.clone();
        tokio::spawn(watch_ctrl_c(shutdown.clone()));

        let handler = self.handler.clone();
        let semaphore = Arc::new(Semaphore::new(self.max_sessions));
        self.join_handle = Some(tokio::spawn(accept_loop(
            listener, handler, semaphore, shutdown,
        )));

        Ok(())
    }

    /// Demande l'arrêt gracieux du serveur
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Attend la fin du serveur et de toutes ses sessions
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }

    /// Récupère les infos du serveur
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            http_port: self.http_port,
            max_sessions: self.max_sessions,
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Option<ConnectionHandler>,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
) {
    let mut sessions = JoinSet::new();

    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        // Récupère les sessions terminées
        while sessions.try_join_next().is_some() {}

        let (mut socket, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };

        let Ok(permit) = semaphore.clone().try_acquire_owned() else {
            warn!("Rejecting {}: all sessions busy", peer);
            tokio::spawn(async move {
                reply_and_close(&mut socket, BUSY_RESPONSE).await;
            });
            continue;
        };

        let handler = handler.clone();
        let token = shutdown.child_token();
        sessions.spawn(async move {
            let _permit = permit;

            let head = read_request_head(&mut socket).await;
            match head.lines().next() {
                Some(line) if !line.is_empty() => info!("Connection from {}: {}", peer, line),
                _ => info!("Connection from {} (no request)", peer),
            }
            debug!("Request head from {}: {:?}", peer, head);

            match handler {
                Some(handler) => handler(socket, peer, token).await,
                None => {
                    warn!("No handler registered, closing {}", peer);
                    reply_and_close(&mut socket, NO_HANDLER_RESPONSE).await;
                }
            }
            debug!("Session with {} finished", peer);
        });
    }

    info!("Server stopped accepting, waiting for {} session(s)", sessions.len());
    while sessions.join_next().await.is_some() {}
    info!("Server stopped");
}

/// Lit l'en-tête de requête du client, sans l'interpréter
///
/// La lecture s'arrête à la ligne vide, à la fin du flux, après
/// [`MAX_REQUEST_HEAD`] octets ou après [`REQUEST_HEAD_TIMEOUT`] ; un client qui
/// n'envoie rien donne une chaîne vide.
pub async fn read_request_head<R>(reader: &mut R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(1024);
    let mut buf = [0u8; 1024];

    let read = async {
        while head.len() < MAX_REQUEST_HEAD {
            let n = match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            let take = n.min(MAX_REQUEST_HEAD - head.len());
            head.extend_from_slice(&buf[..take]);
            if head.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
    };

    if time::timeout(REQUEST_HEAD_TIMEOUT, read).await.is_err() {
        debug!("Request head not complete after {:?}", REQUEST_HEAD_TIMEOUT);
    }

    String::from_utf8_lossy(&head).into_owned()
}

async fn reply_and_close(socket: &mut TcpStream, response: &[u8]) {
    let _ = socket.write_all(response).await;
    let _ = socket.shutdown().await;
}

async fn watch_ctrl_c(shutdown: CancellationToken) {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Ctrl+C reçu, arrêt gracieux (Ctrl+C à nouveau pour forcer)");
    shutdown.cancel();

    if signal::ctrl_c().await.is_ok() {
        warn!("Second Ctrl+C, exiting now");
        std::process::exit(FORCED_EXIT_CODE);
    }
}

/// Builder pattern
pub struct ServerBuilder {
    name: String,
    http_port: u16,
    max_sessions: usize,
}

impl ServerBuilder {
    /// Crée un nouveau builder
    pub fn new(name: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            http_port,
            max_sessions: 1,
        }
    }

    /// Builder initialisé depuis `host.http_port` et `host.max_sessions`
    pub fn new_configured() -> Self {
        let config = get_config();
        Self {
            name: "PMO-Radio-Relay".to_string(),
            http_port: config.get_http_port(),
            max_sessions: config.get_max_sessions().unwrap_or(1),
        }
    }

    pub fn max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Construit le serveur
    pub fn build(self) -> Server {
        Server::new(self.name, self.http_port, self.max_sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_read_request_head_stops_at_blank_line() {
        let (mut client, mut server) = duplex(64 * 1024);
        client
            .write_all(b"GET /radio HTTP/1.0\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let head = read_request_head(&mut server).await;
        assert!(head.starts_with("GET /radio HTTP/1.0\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_read_request_head_closed_client() {
        let (client, mut server) = duplex(1024);
        drop(client);

        assert_eq!(read_request_head(&mut server).await, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_request_head_silent_client() {
        let (_client, mut server) = duplex(1024);

        assert_eq!(read_request_head(&mut server).await, "");
    }

    #[tokio::test]
    async fn test_read_request_head_is_bounded() {
        let (mut client, mut server) = duplex(64 * 1024);
        client.write_all(&vec![b'a'; 20 * 1024]).await.unwrap();

        let head = read_request_head(&mut server).await;
        assert_eq!(head.len(), MAX_REQUEST_HEAD);
    }

    async fn request(addr: SocketAddr) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    fn local(server: &Server) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], server.local_addr().unwrap().port()))
    }

    #[tokio::test]
    async fn test_handler_receives_connection() {
        let mut server = Server::new("test", 0, 1);
        server.set_handler(|mut socket, _peer, _token| async move {
            let _ = socket.write_all(b"hello").await;
        });
        server.start().await.unwrap();

        assert_eq!(request(local(&server)).await, "hello");

        server.stop();
        server.wait().await;
    }

    #[tokio::test]
    async fn test_busy_server_answers_503() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();

        let mut server = Server::new("test", 0, 1);
        server.set_handler(move |_socket, _peer, token| {
            let started = started_tx.clone();
            async move {
                let _ = started.send(());
                token.cancelled().await;
            }
        });
        server.start().await.unwrap();
        let addr = local(&server);

        let first = tokio::spawn(request(addr));
        started_rx.recv().await.unwrap();

        let second = request(addr).await;
        assert!(second.starts_with("HTTP/1.0 503"));

        server.stop();
        server.wait().await;
        assert_eq!(first.await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_without_handler_answers_404() {
        let mut server = Server::new("test", 0, 2);
        server.start().await.unwrap();

        let response = request(local(&server)).await;
        assert!(response.starts_with("HTTP/1.0 404"));
        assert_eq!(server.info().max_sessions, 2);

        server.stop();
        server.wait().await;
    }
}
