//! Key derivation using Argon2id
//!
//! Derives AES-256 keys from passphrases. The parameters travel with every
//! encrypted artifact so old backups stay readable after settings change.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, Params,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{StowawayError, StowawayResult};

/// Parameters for key derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDerivationParams {
    /// Salt for key derivation (base64 encoded)
    pub salt: String,
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism degree (default: 4)
    pub parallelism: u32,
}

impl Default for KeyDerivationParams {
    fn default() -> Self {
        Self {
            salt: String::new(),
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KeyDerivationParams {
    /// Default costs with a fresh random salt
    pub fn new() -> Self {
        Self {
            salt: generate_salt(),
            ..Default::default()
        }
    }

    /// Given costs with a fresh random salt
    pub fn with_costs(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            salt: generate_salt(),
            memory_cost,
            time_cost,
            parallelism,
        }
    }

    /// Same costs, new salt
    pub fn resalted(&self) -> Self {
        Self::with_costs(self.memory_cost, self.time_cost, self.parallelism)
    }
}

fn generate_salt() -> String {
    SaltString::generate(&mut OsRng).to_string()
}

/// A derived encryption key, wiped on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; 32],
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

/// Derive an encryption key from a passphrase
pub fn derive_key(passphrase: &str, params: &KeyDerivationParams) -> StowawayResult<DerivedKey> {
    let salt = SaltString::from_b64(&params.salt)
        .map_err(|e| StowawayError::Encryption(format!("Invalid salt: {}", e)))?;

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| StowawayError::Encryption(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| StowawayError::Encryption(format!("Key derivation failed: {}", e)))?;

    let hash_output = hash
        .hash
        .ok_or_else(|| StowawayError::Encryption("No hash output generated".to_string()))?;

    let hash_bytes = hash_output.as_bytes();
    if hash_bytes.len() < 32 {
        return Err(StowawayError::Encryption(
            "Hash output too short for AES-256 key".to_string(),
        ));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&hash_bytes[..32]);
    Ok(DerivedKey { key })
}
