//! Réponses XML de l'API Last.fm
//!
//! Toutes les réponses ont la forme `<lfm status="ok">…</lfm>` ; en cas d'échec
//! le service renvoie `<lfm status="failed"><error code="N">message</error></lfm>`.

use crate::error::{LastFmError, Result};
use xmltree::{Element, XMLNode};

/// Réponse parsée d'un appel API
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// `true` si l'attribut `status` de la racine vaut `ok`
    pub status: bool,
    /// Élément racine (`lfm`)
    pub root: Element,
}

impl ApiResponse {
    /// Parse un corps de réponse
    ///
    /// # Errors
    ///
    /// * `LastFmError::Protocol` - Le document n'est pas du XML valide
    pub fn parse(body: &[u8]) -> Result<Self> {
        let root = Element::parse(body)
            .map_err(|e| LastFmError::protocol(format!("invalid XML response: {e}")))?;

        // Le statut est lu avant toute donnée enfant
        let status = root
            .attributes
            .get("status")
            .map(|s| s == "ok")
            .unwrap_or(false);

        Ok(Self { status, root })
    }

    /// Suit un chemin d'éléments enfants depuis la racine (`"session/key"`)
    pub fn element(&self, path: &str) -> Option<&Element> {
        find_path(&self.root, path)
    }

    /// Texte (trimé, non vide) de l'élément au bout du chemin
    pub fn text(&self, path: &str) -> Option<String> {
        self.element(path).and_then(element_text)
    }

    /// Code et message de l'élément `<error>` d'une réponse en échec
    pub fn error(&self) -> (Option<u32>, String) {
        match self.root.get_child("error") {
            Some(err) => {
                let code = err
                    .attributes
                    .get("code")
                    .and_then(|c| c.trim().parse().ok());
                let message = element_text(err).unwrap_or_else(|| "unknown error".to_string());
                (code, message)
            }
            None => (None, "unknown error".to_string()),
        }
    }
}

/// Descend dans l'arbre en suivant les noms séparés par `/`
pub(crate) fn find_path<'a>(root: &'a Element, path: &str) -> Option<&'a Element> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .try_fold(root, |current, segment| current.get_child(segment))
}

/// Itère sur les enfants éléments portant un nom donné, dans l'ordre du document
pub(crate) fn children_named<'a>(
    parent: &'a Element,
    name: &'a str,
) -> impl Iterator<Item = &'a Element> + 'a {
    parent.children.iter().filter_map(move |node| match node {
        XMLNode::Element(elem) if elem.name == name => Some(elem),
        _ => None,
    })
}

/// Texte d'un élément, `None` s'il est vide
pub(crate) fn element_text(elem: &Element) -> Option<String> {
    elem.get_text()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
