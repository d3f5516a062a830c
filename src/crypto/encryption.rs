//! AES-256-GCM encryption/decryption
//!
//! Every call generates a fresh random nonce. `seal`/`open` work on raw
//! bytes; `EncryptedData` is the base64 form kept in the settings file.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{StowawayError, StowawayResult};

use super::DerivedKey;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Encrypted data with associated metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    /// Nonce (base64)
    pub nonce: String,
    /// Ciphertext with authentication tag (base64)
    pub ciphertext: String,
    #[serde(default = "default_version")]
    pub version: u8,
}

fn default_version() -> u8 {
    1
}

impl EncryptedData {
    fn new(nonce: &[u8], ciphertext: &[u8]) -> Self {
        Self {
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
            version: 1,
        }
    }

    fn decode_field(value: &str, what: &str) -> StowawayResult<Vec<u8>> {
        STANDARD
            .decode(value)
            .map_err(|e| StowawayError::Encryption(format!("Invalid {} encoding: {}", what, e)))
    }
}

fn cipher_for(key: &DerivedKey) -> StowawayResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| StowawayError::Encryption(format!("Failed to create cipher: {}", e)))
}

/// Encrypt raw bytes, returning the generated nonce and the ciphertext
pub fn seal(plaintext: &[u8], key: &DerivedKey) -> StowawayResult<([u8; NONCE_SIZE], Vec<u8>)> {
    let cipher = cipher_for(key)?;
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| StowawayError::Encryption(format!("Encryption failed: {}", e)))?;
    Ok((nonce_bytes, ciphertext))
}

/// Decrypt and authenticate raw bytes
pub fn open(nonce: &[u8], ciphertext: &[u8], key: &DerivedKey) -> StowawayResult<Vec<u8>> {
    if nonce.len() != NONCE_SIZE {
        return Err(StowawayError::Encryption(format!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce.len()
        )));
    }
    cipher_for(key)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            StowawayError::Encryption("Decryption failed: invalid key or corrupted data".to_string())
        })
}

pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> StowawayResult<EncryptedData> {
    let (nonce, ciphertext) = seal(plaintext, key)?;
    Ok(EncryptedData::new(&nonce, &ciphertext))
}

pub fn decrypt(encrypted: &EncryptedData, key: &DerivedKey) -> StowawayResult<Vec<u8>> {
    if encrypted.version != 1 {
        return Err(StowawayError::Encryption(format!(
            "Unsupported encryption version: {}",
            encrypted.version
        )));
    }
    let nonce = EncryptedData::decode_field(&encrypted.nonce, "nonce")?;
    let ciphertext = EncryptedData::decode_field(&encrypted.ciphertext, "ciphertext")?;
    open(&nonce, &ciphertext, key)
}
