//! Module de signature MD5 pour les requêtes Last.fm
//!
//! Toutes les requêtes de l'API 2.0 utilisées ici sont signées : les paramètres
//! sont triés par nom, concaténés sous la forme `nomvaleur`, suivis du secret
//! partagé, et le MD5 hexadécimal de cette chaîne devient `api_sig`.

use md5::{Digest, Md5};
use std::collections::BTreeMap;
use url::form_urlencoded;

/// Paramètres d'une requête, triés par nom (ordre des octets)
pub type Params = BTreeMap<String, String>;

/// MD5 d'une chaîne, en hexadécimal minuscule
pub fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Calcule `api_sig` pour un ensemble de paramètres
///
/// # Arguments
///
/// * `params` - Tous les paramètres de la requête, y compris `method`, `api_key` et `sk`
/// * `secret` - Secret partagé de l'application
///
/// # Returns
///
/// Signature MD5 hexadécimale
pub fn api_signature(params: &Params, secret: &str) -> String {
    let mut hasher = Md5::new();

    for (key, value) in params {
        hasher.update(key.as_bytes());
        hasher.update(value.as_bytes());
    }
    hasher.update(secret.as_bytes());

    format!("{:x}", hasher.finalize())
}

/// Construit la chaîne de requête encodée, dans l'ordre trié, terminée par `api_sig`
///
/// La même chaîne sert de query string (GET) ou de corps de formulaire (POST).
pub fn encode_request(params: &Params, signature: &str) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("api_sig", signature);
    serializer.finish()
}
