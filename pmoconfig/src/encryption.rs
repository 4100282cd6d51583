//! Chiffrement des secrets de la configuration
//!
//! Les mots de passe et secrets d'API peuvent être stockés sous la forme
//! `encrypted:BASE64` dans `config.yaml`. La clé AES-256-GCM est dérivée de
//! l'identifiant de la machine : le fichier n'est donc pas portable d'une
//! machine à l'autre, mais les secrets n'y apparaissent pas en clair.
//!
//! Format encodé : `nonce(12 octets) + ciphertext`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Result};
use base64::Engine;
use sha2::{Digest, Sha256};
use std::env;

/// Préfixe des valeurs chiffrées
const ENCRYPTED_PREFIX: &str = "encrypted:";

/// Variable d'environnement remplaçant l'identifiant de la machine
const ENV_MACHINE_ID: &str = "PMORELAY_MACHINE_ID";

const KEY_SALT: &[u8] = b"pmorelay-config-encryption-v1";
const NONCE_SALT: &[u8] = b"pmorelay-nonce-v1";
const NONCE_LEN: usize = 12;

/// Identifiant stable de la machine
///
/// `PMORELAY_MACHINE_ID` s'il est défini (conteneurs, tests), sinon
/// l'identifiant fourni par le système.
fn machine_id() -> Result<String> {
    if let Ok(id) = env::var(ENV_MACHINE_ID) {
        if !id.trim().is_empty() {
            return Ok(id.trim().to_string());
        }
    }
    system_machine_id()
}

#[cfg(target_os = "linux")]
fn system_machine_id() -> Result<String> {
    ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|id| id.trim().to_string())
        .find(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("Failed to read machine-id (set {})", ENV_MACHINE_ID))
}

#[cfg(target_os = "macos")]
fn system_machine_id() -> Result<String> {
    let output = std::process::Command::new("ioreg")
        .args(["-d2", "-c", "IOPlatformExpertDevice"])
        .output()?;

    // "IOPlatformUUID" = "XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX"
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .find(|line| line.contains("IOPlatformUUID"))
        .and_then(|line| line.split('"').nth(3))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Failed to extract IOPlatformUUID from ioreg"))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn system_machine_id() -> Result<String> {
    Err(anyhow!(
        "No machine identifier on this platform, set {}",
        ENV_MACHINE_ID
    ))
}

fn cipher() -> Result<Aes256Gcm> {
    let mut hasher = Sha256::new();
    hasher.update(machine_id()?.as_bytes());
    hasher.update(KEY_SALT);
    let key = hasher.finalize();

    Aes256Gcm::new_from_slice(&key).map_err(|e| anyhow!("Failed to create cipher: {}", e))
}

/// Chiffre un secret avec la clé de la machine
///
/// Le nonce est dérivé du secret : chiffrer deux fois la même valeur donne la
/// même chaîne, et la configuration sauvegardée ne change pas inutilement.
///
/// # Example
///
/// ```rust,ignore
/// let encrypted = encrypt_password("my_password")?;
/// // encrypted = "encrypted:SGVsbG8gV29ybGQh..."
/// ```
pub fn encrypt_password(password: &str) -> Result<String> {
    let cipher = cipher()?;

    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(NONCE_SALT);
    let digest = hasher.finalize();
    let nonce_bytes = &digest[..NONCE_LEN];

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce_bytes), password.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(format!(
        "{}{}",
        ENCRYPTED_PREFIX,
        base64::engine::general_purpose::STANDARD.encode(&combined)
    ))
}

/// Déchiffre une valeur `encrypted:BASE64`
///
/// # Errors
///
/// Retourne une erreur si le format est invalide ou si la valeur a été
/// chiffrée sur une autre machine.
pub fn decrypt_password(encrypted: &str) -> Result<String> {
    let encoded = encrypted
        .strip_prefix(ENCRYPTED_PREFIX)
        .ok_or_else(|| anyhow!("Invalid encrypted password format (missing prefix)"))?;

    let combined = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| anyhow!("Invalid base64: {}", e))?;

    if combined.len() < NONCE_LEN {
        return Err(anyhow!("Invalid ciphertext (too short)"));
    }
    let (nonce, ciphertext) = combined.split_at(NONCE_LEN);

    let plaintext = cipher()?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| anyhow!("Decryption failed (wrong machine or corrupted data): {}", e))?;

    String::from_utf8(plaintext).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
}

/// `true` si la valeur commence par `encrypted:`
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Renvoie le secret en clair, qu'il soit stocké chiffré ou non
pub fn get_password(value: &str) -> Result<String> {
    if is_encrypted(value) {
        decrypt_password(value)
    } else {
        Ok(value.to_string())
    }
}
