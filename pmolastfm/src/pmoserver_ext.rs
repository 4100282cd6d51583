//! Extension pour brancher le relais radio sur pmoserver
//!
//! Chaque connexion acceptée par le serveur devient une [`RelaySession`]
//! qui relaye la station configurée vers le lecteur, jusqu'à la fin du flux,
//! la déconnexion du lecteur ou l'arrêt du serveur.
//!
//! [`RelaySession`]: crate::relay::RelaySession

use crate::relay::RadioRelay;
use pmoserver::Server;
use std::sync::Arc;
use tracing::{info, warn};

/// Trait d'extension pour servir un [`RadioRelay`] depuis pmoserver
///
/// # Exemple
///
/// ```rust,ignore
/// use pmolastfm::{LastFmServerExt, RadioRelay};
/// use pmoserver::ServerBuilder;
///
/// let relay = RadioRelay::from_config(&pmoconfig::get_config()).await?;
/// let mut server = ServerBuilder::new_configured().build();
/// server.attach_relay(relay);
/// server.start().await?;
/// server.wait().await;
/// ```
pub trait LastFmServerExt {
    /// Enregistre le relais comme handler de connexion
    fn attach_relay(&mut self, relay: RadioRelay);
}

impl LastFmServerExt for Server {
    fn attach_relay(&mut self, relay: RadioRelay) {
        let relay = Arc::new(relay);
        info!("Relaying {} on incoming connections", relay.settings().station);

        self.set_handler(move |socket, peer, shutdown| {
            let relay = relay.clone();
            async move {
                match relay.serve(socket, shutdown).await {
                    Ok(stats) => info!(
                        "Listener {} done: {} tracks, {} bytes",
                        peer, stats.tracks_played, stats.bytes_forwarded
                    ),
                    Err(e) => warn!("Relay to {} failed: {}", peer, e),
                }
            }
        });
    }
}
