//! # pmoserver - Accepteur de connexions pour les relais PMO
//!
//! Cette crate fournit un serveur TCP minimal : il accepte les connexions des
//! lecteurs, lit leur en-tête de requête et confie chaque socket à un handler
//! enregistré par une autre crate (par exemple le relais radio de `pmolastfm`).
//!
//! ## Fonctionnalités
//!
//! - 🎯 **Handler unique** : une closure async par connexion, avec un jeton d'arrêt
//! - 🚦 **Sessions bornées** : `503` quand toutes les sessions sont occupées
//! - 📜 **Logs** : initialisation de `tracing` depuis la configuration
//! - ⚡ **Arrêt gracieux** : Ctrl+C annule les sessions, un second Ctrl+C force la sortie
//!
//! ## Architecture
//!
//! - [`server`] : serveur et builder
//! - [`logs`] : initialisation du subscriber `tracing`
//!
//! ## Exemple d'utilisation
//!
//! ```rust,no_run
//! use pmoserver::{ServerBuilder, logs::{init_logging, LoggingOptions}};
//! use tokio::io::AsyncWriteExt;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     init_logging(LoggingOptions::from_config());
//!
//!     let mut server = ServerBuilder::new("MyRelay", 2000).max_sessions(4).build();
//!     server.set_handler(|mut socket, _peer, _shutdown| async move {
//!         let _ = socket.write_all(b"HTTP/1.0 204 No Content\r\n\r\n").await;
//!     });
//!
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod server;

pub use logs::{LoggingOptions, init_logging};
pub use server::{ConnectionHandler, Server, ServerBuilder, ServerInfo, read_request_head};
