//! Whole-file encryption behind the `Encryptor` seam
//!
//! Encrypted artifacts are self-describing:
//!
//! ```text
//! u8  flag          0x01
//! u8  cipher id     CipherAlgorithm id
//! u8  version       1
//! u8  reserved      0
//! u32 memory cost   Argon2 KiB
//! u32 time cost
//! u32 parallelism
//! u32 salt length
//! salt              base64 salt string (ASCII)
//! [u8; 12] nonce
//! ciphertext + tag
//! ```

use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use super::encryption::{open, seal, NONCE_SIZE};
use super::key_derivation::{derive_key, KeyDerivationParams};
use super::secure_memory::SecureString;
use crate::binio::{read_bytes, read_u32, read_u8, write_u32};
use crate::error::{StowawayError, StowawayResult};

/// Leading byte of every encrypted artifact
pub const CIPHER_FLAG: u8 = 0x01;

const FORMAT_VERSION: u8 = 1;

/// Longest salt string argon2 produces
const MAX_SALT_LEN: u32 = 64;

/// Upper bounds on Argon2 costs accepted from an artifact header (memory in KiB)
const MAX_MEMORY_COST: u32 = 4 * 1024 * 1024;
const MAX_TIME_COST: u32 = 64;
const MAX_PARALLELISM: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherAlgorithm {
    Aes256Gcm = 0x10,
}

impl CipherAlgorithm {
    pub const ALL: [CipherAlgorithm; 1] = [CipherAlgorithm::Aes256Gcm];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherAlgorithm::Aes256Gcm => "aes256gcm",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            CipherAlgorithm::Aes256Gcm => "enc",
        }
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Encrypts and decrypts single files
pub trait Encryptor {
    fn algorithm(&self) -> CipherAlgorithm;

    /// Encrypt `src` into `dest`. On failure nothing is left at `dest`.
    fn encrypt_file(&self, src: &Path, dest: &Path) -> StowawayResult<()>;

    /// Decrypt `src` into `dest`. On failure nothing is left at `dest`.
    fn decrypt_file(&self, src: &Path, dest: &Path) -> StowawayResult<()>;

    /// Where `encrypt_file` output for `src` goes by default
    fn encrypted_path(&self, src: &Path) -> PathBuf {
        let mut name = src.as_os_str().to_os_string();
        name.push(".");
        name.push(self.algorithm().extension());
        PathBuf::from(name)
    }
}

/// Parsed header of an encrypted artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherHeader {
    pub algorithm: CipherAlgorithm,
    pub version: u8,
    pub params: KeyDerivationParams,
    pub nonce: [u8; NONCE_SIZE],
}

impl CipherHeader {
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_all(&[CIPHER_FLAG, self.algorithm.id(), self.version, 0])?;
        write_u32(out, self.params.memory_cost)?;
        write_u32(out, self.params.time_cost)?;
        write_u32(out, self.params.parallelism)?;
        write_u32(out, self.params.salt.len() as u32)?;
        out.write_all(self.params.salt.as_bytes())?;
        out.write_all(&self.nonce)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> StowawayResult<Self> {
        let flag = read_u8(reader, "encryption flag")?;
        if flag != CIPHER_FLAG {
            return Err(StowawayError::Format(format!(
                "not an encrypted artifact (flag byte {:#04x})",
                flag
            )));
        }
        let id = read_u8(reader, "cipher id")?;
        let algorithm = CipherAlgorithm::from_id(id).ok_or_else(|| {
            StowawayError::Format(format!("unknown cipher algorithm id {:#04x}", id))
        })?;
        let version = read_u8(reader, "format version")?;
        if version != FORMAT_VERSION {
            return Err(StowawayError::Format(format!(
                "unsupported encrypted artifact version {}",
                version
            )));
        }
        let _reserved = read_u8(reader, "reserved byte")?;

        let memory_cost = read_u32(reader, "memory cost")?;
        let time_cost = read_u32(reader, "time cost")?;
        let parallelism = read_u32(reader, "parallelism")?;
        if memory_cost == 0
            || memory_cost > MAX_MEMORY_COST
            || time_cost == 0
            || time_cost > MAX_TIME_COST
            || parallelism == 0
            || parallelism > MAX_PARALLELISM
        {
            return Err(StowawayError::Format(format!(
                "implausible key derivation costs (memory {} KiB, time {}, parallelism {})",
                memory_cost, time_cost, parallelism
            )));
        }
        let salt_len = read_u32(reader, "salt length")?;
        if salt_len == 0 || salt_len > MAX_SALT_LEN {
            return Err(StowawayError::Format(format!("invalid salt length {}", salt_len)));
        }
        let salt = String::from_utf8(read_bytes(reader, salt_len as usize, "salt")?)
            .map_err(|_| StowawayError::Format("salt is not valid text".to_string()))?;

        let mut nonce = [0u8; NONCE_SIZE];
        reader
            .read_exact(&mut nonce)
            .map_err(|e| crate::binio::truncated(e, "nonce"))?;

        Ok(Self {
            algorithm,
            version,
            params: KeyDerivationParams {
                salt,
                memory_cost,
                time_cost,
                parallelism,
            },
            nonce,
        })
    }
}

/// Read the header of an encrypted artifact on disk
pub fn read_header(path: &Path) -> StowawayResult<CipherHeader> {
    let mut file = File::open(path)?;
    CipherHeader::read_from(&mut file)
}

/// AES-256-GCM with an Argon2id key derived per artifact from a passphrase
pub struct PassphraseCipher {
    passphrase: SecureString,
    /// Costs applied to new artifacts; every artifact gets its own salt
    params: KeyDerivationParams,
}

impl PassphraseCipher {
    pub fn new(passphrase: impl Into<SecureString>, params: KeyDerivationParams) -> Self {
        Self {
            passphrase: passphrase.into(),
            params,
        }
    }

    fn seal_file(&self, src: &Path, dest: &Path) -> StowawayResult<()> {
        let plaintext = fs::read(src)?;
        let params = self.params.resalted();
        let key = derive_key(&self.passphrase, &params)?;
        let (nonce, ciphertext) = seal(&plaintext, &key)?;

        let header = CipherHeader {
            algorithm: self.algorithm(),
            version: FORMAT_VERSION,
            params,
            nonce,
        };
        let mut out = File::create(dest)?;
        header.write_to(&mut out)?;
        out.write_all(&ciphertext)?;
        out.sync_all()?;
        Ok(())
    }

    fn open_file(&self, src: &Path, dest: &Path) -> StowawayResult<()> {
        let raw = fs::read(src)?;
        let mut reader = raw.as_slice();
        let header = CipherHeader::read_from(&mut reader)?;
        let key = derive_key(&self.passphrase, &header.params)?;
        let plaintext = open(&header.nonce, reader, &key)?;
        fs::write(dest, plaintext)?;
        Ok(())
    }
}

impl Encryptor for PassphraseCipher {
    fn algorithm(&self) -> CipherAlgorithm {
        CipherAlgorithm::Aes256Gcm
    }

    fn encrypt_file(&self, src: &Path, dest: &Path) -> StowawayResult<()> {
        if !src.is_file() {
            return Err(StowawayError::file_not_found(src.display().to_string()));
        }
        self.seal_file(src, dest).map_err(|e| {
            let _ = fs::remove_file(dest);
            e
        })?;
        info!(source = %src.display(), artifact = %dest.display(), "Encrypted file");
        Ok(())
    }

    fn decrypt_file(&self, src: &Path, dest: &Path) -> StowawayResult<()> {
        if !src.is_file() {
            return Err(StowawayError::artifact_not_found(src.display().to_string()));
        }
        self.open_file(src, dest).map_err(|e| {
            let _ = fs::remove_file(dest);
            e
        })
    }
}
