//! En-tête écrit à l'auditeur avant les premiers octets audio
//!
//! Le relais se présente comme une source de radio internet : une ligne de
//! statut HTTP/1.0, quelques en-têtes `icy-*`, puis le flux brut.

use std::fmt::Write as _;

/// Débit nominal annoncé par défaut (kbit/s)
pub const DEFAULT_BITRATE: u32 = 128;

/// Type de contenu du flux relayé
pub const CONTENT_TYPE: &str = "audio/mpeg";

/// Préambule du flux descendant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPreamble {
    /// Nom affiché par le lecteur (`icy-name`)
    pub name: String,
    /// URL de la source (`icy-url`)
    pub url: String,
    /// Débit nominal (`icy-br`)
    pub bitrate: u32,
}

impl StreamPreamble {
    pub fn new(name: impl Into<String>, url: impl Into<String>, bitrate: u32) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            bitrate,
        }
    }

    /// Rend le bloc d'en-têtes, terminé par la ligne vide
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(160);
        out.push_str("HTTP/1.0 200 OK\r\n");
        out.push_str("Connection: close\r\n");
        let _ = write!(out, "Content-Type: {CONTENT_TYPE}\r\n");
        let _ = write!(out, "icy-name: {}\r\n", header_value(&self.name));
        let _ = write!(out, "icy-url: {}\r\n", header_value(&self.url));
        let _ = write!(out, "icy-br: {}\r\n", self.bitrate);
        out.push_str("\r\n");
        out
    }
}

/// Retire les retours chariot et sauts de ligne d'une valeur d'en-tête
fn header_value(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let preamble = StreamPreamble::new(
            "Example Radio",
            "http://www.last.fm/listen/user/rj/personal",
            128,
        );

        assert_eq!(
            preamble.render(),
            "HTTP/1.0 200 OK\r\n\
             Connection: close\r\n\
             Content-Type: audio/mpeg\r\n\
             icy-name: Example Radio\r\n\
             icy-url: http://www.last.fm/listen/user/rj/personal\r\n\
             icy-br: 128\r\n\
             \r\n"
        );
    }

    #[test]
    fn test_header_injection_is_neutralised() {
        let preamble = StreamPreamble::new("Evil\r\nX-Injected: 1", "u", 96);
        let rendered = preamble.render();

        assert!(rendered.contains("icy-name: Evil  X-Injected: 1\r\n"));
        assert_eq!(rendered.matches("\r\n\r\n").count(), 1);
    }
}
