//! Chiffrement des secrets de configuration lié à la machine
//!
//! Les secrets (client secret et refresh token Spotify) peuvent être stockés
//! dans `config.yaml` sous la forme `encrypted:<base64>`. La clé AES-256-GCM
//! est dérivée de l'identifiant de la machine : le fichier n'est pas portable
//! d'une machine à l'autre, mais ne contient aucun secret en clair.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use anyhow::{Result, anyhow};
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fs;

/// Préfixe pour identifier les valeurs chiffrées
const ENCRYPTED_PREFIX: &str = "encrypted:";

const KEY_SALT: &[u8] = b"partybox-config-encryption-v1";
const NONCE_SALT: &[u8] = b"partybox-nonce-v1";

/// Récupère l'identifiant de la machine
///
/// `/etc/machine-id`, puis `/var/lib/dbus/machine-id`, puis `/etc/hostname`
/// en dernier recours (images minimales sans systemd).
fn get_machine_id() -> Result<String> {
    for candidate in ["/etc/machine-id", "/var/lib/dbus/machine-id", "/etc/hostname"] {
        if let Ok(id) = fs::read_to_string(candidate) {
            let id = id.trim();
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
    }
    Err(anyhow!("Failed to read machine-id"))
}

/// Dérive une clé AES-256 à partir d'un identifiant de machine
fn derive_key(machine_id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(machine_id.as_bytes());
    hasher.update(KEY_SALT);
    let mut key = [0u8; 32];
    key.copy_from_slice(&hasher.finalize());
    key
}

fn machine_key() -> Result<[u8; 32]> {
    Ok(derive_key(&get_machine_id()?))
}

fn encrypt_with_key(key: &[u8; 32], secret: &str) -> Result<String> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    // Nonce déterministe : même secret = même texte chiffré, le fichier de
    // config ne change pas tant que le secret ne change pas
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(NONCE_SALT);
    let nonce_hash = hasher.finalize();
    let nonce_bytes = &nonce_hash[..12];

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce_bytes), secret.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    // nonce(12 octets) + ciphertext
    let mut combined = Vec::with_capacity(12 + ciphertext.len());
    combined.extend_from_slice(nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(format!(
        "{}{}",
        ENCRYPTED_PREFIX,
        base64::engine::general_purpose::STANDARD.encode(&combined)
    ))
}

fn decrypt_with_key(key: &[u8; 32], encrypted: &str) -> Result<String> {
    let base64_data = encrypted
        .strip_prefix(ENCRYPTED_PREFIX)
        .ok_or_else(|| anyhow!("Invalid encrypted value format (missing prefix)"))?;

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    let combined = base64::engine::general_purpose::STANDARD
        .decode(base64_data)
        .map_err(|e| anyhow!("Invalid base64: {}", e))?;

    if combined.len() < 12 {
        return Err(anyhow!("Invalid ciphertext (too short)"));
    }

    let (nonce, ciphertext) = combined.split_at(12);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| anyhow!("Decryption failed (wrong machine or corrupted data): {}", e))?;

    String::from_utf8(plaintext).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
}

/// Chiffre un secret avec la clé de la machine
///
/// # Returns
///
/// Le secret chiffré au format `encrypted:BASE64`
///
/// # Example
///
/// ```rust,ignore
/// let stored = encrypt_secret("AQD...refresh-token")?;
/// config.set_string(&["spotify", "refresh_token"], &stored)?;
/// ```
pub fn encrypt_secret(secret: &str) -> Result<String> {
    encrypt_with_key(&machine_key()?, secret)
}

/// Déchiffre un secret au format `encrypted:BASE64`
pub fn decrypt_secret(encrypted: &str) -> Result<String> {
    decrypt_with_key(&machine_key()?, encrypted)
}

/// Vérifie si une valeur est chiffrée
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Obtient le secret en clair, qu'il soit stocké chiffré ou non
pub fn reveal_secret(value: &str) -> Result<String> {
    if is_encrypted(value) {
        decrypt_secret(value)
    } else {
        Ok(value.to_string())
    }
}
