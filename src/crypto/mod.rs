//! Cryptographic functions for Stowaway
//!
//! AES-256-GCM with Argon2id key derivation, used for encrypted backup
//! artifacts and for the passphrase verification token in settings.

pub mod cipher;
pub mod encryption;
pub mod key_derivation;
pub mod secure_memory;

pub use cipher::{CipherAlgorithm, CipherHeader, Encryptor, PassphraseCipher, CIPHER_FLAG};
pub use encryption::{decrypt, encrypt, EncryptedData};
pub use key_derivation::{derive_key, DerivedKey, KeyDerivationParams};
pub use secure_memory::SecureString;
