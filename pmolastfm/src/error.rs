//! Gestion des erreurs pour le client Last.fm et le relais

use thiserror::Error;

/// Type Result personnalisé pour pmolastfm
pub type Result<T> = std::result::Result<T, LastFmError>;

/// Erreurs possibles lors de l'utilisation du client Last.fm et du relais
#[derive(Error, Debug)]
pub enum LastFmError {
    /// Erreur réseau vers l'API ou vers l'hôte des médias
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Réponse XML illisible ou incomplète
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Authentification refusée par le service
    #[error("Authentication failed (code {code:?}): {message}")]
    Auth { code: Option<u32>, message: String },

    /// Réponse bien formée avec un statut d'échec
    #[error("Last.fm API error on {method} (code {code:?}): {message}")]
    Api {
        method: String,
        code: Option<u32>,
        message: String,
    },

    /// Trop de redirections en récupérant une piste
    #[error("Too many redirects (more than {max}) while fetching {url}")]
    RedirectLoop { url: String, max: usize },

    /// Statut HTTP inattendu de l'hôte des médias
    #[error("Upstream returned HTTP {status} for {url}")]
    Upstream { url: String, status: u16 },

    /// URL de piste ou de redirection invalide
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Écriture impossible vers l'auditeur
    #[error("Downstream write failed: {0}")]
    Downstream(#[source] std::io::Error),
}

impl LastFmError {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Vrai pour les erreurs qui ne concernent que la piste en cours de
    /// téléchargement : le relais passe alors à la piste suivante.
    pub fn is_track_local(&self) -> bool {
        matches!(
            self,
            LastFmError::Transport(_)
                | LastFmError::RedirectLoop { .. }
                | LastFmError::Upstream { .. }
                | LastFmError::InvalidUrl(_)
        )
    }

    /// Vrai si l'auditeur s'est déconnecté
    pub fn is_downstream(&self) -> bool {
        matches!(self, LastFmError::Downstream(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_local_classification() {
        let redirect = LastFmError::RedirectLoop {
            url: "http://example.com/a.mp3".to_string(),
            max: 10,
        };
        assert!(redirect.is_track_local());

        let upstream = LastFmError::Upstream {
            url: "http://example.com/a.mp3".to_string(),
            status: 404,
        };
        assert!(upstream.is_track_local());

        let api = LastFmError::Api {
            method: "radio.getPlaylist".to_string(),
            code: Some(6),
            message: "Invalid parameters".to_string(),
        };
        assert!(!api.is_track_local());

        let downstream = LastFmError::Downstream(std::io::Error::from(
            std::io::ErrorKind::BrokenPipe,
        ));
        assert!(!downstream.is_track_local());
        assert!(downstream.is_downstream());
    }
}
