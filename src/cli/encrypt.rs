//! Encryption CLI commands
//!
//! Provides commands for enabling, disabling, and checking backup encryption,
//! and the passphrase handling shared with `backup` and `recover`.

use clap::Subcommand;

use crate::config::{paths::StowawayPaths, settings::Settings};
use crate::crypto::{
    decrypt, derive_key, encrypt, KeyDerivationParams, PassphraseCipher, SecureString,
};
use crate::error::{StowawayError, StowawayResult};

/// Environment variable read instead of prompting for a passphrase
pub const PASSPHRASE_ENV: &str = "STOWAWAY_PASSPHRASE";

/// Known plaintext sealed into the verification token
const VERIFY_TOKEN: &[u8] = b"stowaway_verify";

const MIN_PASSPHRASE_LEN: usize = 8;

/// Encryption management commands
#[derive(Subcommand)]
pub enum EncryptCommands {
    /// Encrypt new backups by default
    Enable,

    /// Stop encrypting new backups (requires current passphrase)
    Disable,

    /// Show encryption status
    Status,

    /// Verify your passphrase is correct
    Verify,
}

/// Handle encryption commands
pub fn handle_encrypt_command(
    paths: &StowawayPaths,
    settings: &mut Settings,
    cmd: EncryptCommands,
) -> StowawayResult<()> {
    match cmd {
        EncryptCommands::Enable => enable_encryption(paths, settings),
        EncryptCommands::Disable => disable_encryption(paths, settings),
        EncryptCommands::Status => show_status(settings),
        EncryptCommands::Verify => verify_passphrase(settings),
    }
}

fn enable_encryption(paths: &StowawayPaths, settings: &mut Settings) -> StowawayResult<()> {
    if settings.is_encryption_enabled() {
        println!("Encryption is already enabled.");
        return Ok(());
    }

    println!("Enable Encryption");
    println!("=================");
    println!();
    println!("New backups will be sealed with AES-256-GCM.");
    println!("IMPORTANT: If you forget your passphrase, your backups cannot be recovered!");
    println!();

    let passphrase = new_passphrase()?;
    let key_params = match &settings.encryption.key_params {
        Some(previous) => previous.resalted(),
        None => KeyDerivationParams::new(),
    };

    println!("Deriving encryption key...");
    let key = derive_key(&passphrase, &key_params)?;
    let token = encrypt(VERIFY_TOKEN, &key)?;

    settings.encryption.enabled = true;
    settings.encryption.key_params = Some(key_params);
    settings.encryption.verification_token = Some(token);
    settings.save(paths)?;

    println!();
    println!("Encryption enabled successfully!");
    println!("Packed and single-file backups created from now on are encrypted.");
    Ok(())
}

fn disable_encryption(paths: &StowawayPaths, settings: &mut Settings) -> StowawayResult<()> {
    if !settings.is_encryption_enabled() {
        println!("Encryption is not enabled.");
        return Ok(());
    }

    let passphrase = read_passphrase("Enter current passphrase: ")?;
    check_passphrase(settings, &passphrase)?;

    settings.encryption.enabled = false;
    settings.encryption.verification_token = None;
    settings.save(paths)?;

    println!("Encryption disabled. Existing encrypted backups still need the passphrase.");
    Ok(())
}

fn show_status(settings: &Settings) -> StowawayResult<()> {
    println!("Encryption Status");
    println!("=================");
    println!();

    if settings.is_encryption_enabled() {
        println!("Status: ENABLED");
        println!();
        if let Some(ref params) = settings.encryption.key_params {
            println!("Key Derivation Parameters:");
            println!("  Algorithm: Argon2id");
            println!("  Memory Cost: {} KiB", params.memory_cost);
            println!("  Time Cost: {} iterations", params.time_cost);
            println!("  Parallelism: {} threads", params.parallelism);
        }
    } else {
        println!("Status: DISABLED");
        println!();
        println!("Run 'stowaway encrypt enable' to encrypt new backups.");
    }

    Ok(())
}

fn verify_passphrase(settings: &Settings) -> StowawayResult<()> {
    if !settings.is_encryption_enabled() {
        println!("Encryption is not enabled.");
        return Ok(());
    }

    let passphrase = read_passphrase("Enter passphrase: ")?;
    match check_passphrase(settings, &passphrase) {
        Ok(()) => {
            println!("Passphrase is correct!");
            Ok(())
        }
        Err(e) => {
            println!("Passphrase is incorrect.");
            Err(e)
        }
    }
}

/// Check a passphrase against the stored verification token
///
/// Passes when no token is stored.
fn check_passphrase(settings: &Settings, passphrase: &str) -> StowawayResult<()> {
    let (Some(params), Some(token)) = (
        settings.encryption.key_params.as_ref(),
        settings.encryption.verification_token.as_ref(),
    ) else {
        return Ok(());
    };

    let key = derive_key(passphrase, params)?;
    let plaintext = decrypt(token, &key)
        .map_err(|_| StowawayError::Encryption("Invalid passphrase".to_string()))?;
    if plaintext != VERIFY_TOKEN {
        return Err(StowawayError::Encryption("Invalid passphrase".to_string()));
    }
    Ok(())
}

/// Cipher for sealing new backups, with the configured Argon2 costs
pub fn backup_cipher(settings: &Settings) -> StowawayResult<PassphraseCipher> {
    let passphrase = read_passphrase("Backup passphrase: ")?;
    check_passphrase(settings, &passphrase)?;
    let params = settings.encryption.key_params.clone().unwrap_or_default();
    Ok(PassphraseCipher::new(passphrase, params))
}

/// Cipher for opening existing backups; costs come from each artifact
pub fn recovery_cipher() -> StowawayResult<PassphraseCipher> {
    let passphrase = read_passphrase("Backup passphrase: ")?;
    Ok(PassphraseCipher::new(passphrase, KeyDerivationParams::default()))
}

fn new_passphrase() -> StowawayResult<SecureString> {
    if let Some(from_env) = passphrase_from_env() {
        if from_env.len() < MIN_PASSPHRASE_LEN {
            return Err(StowawayError::Validation(format!(
                "Passphrase must be at least {} characters",
                MIN_PASSPHRASE_LEN
            )));
        }
        return Ok(from_env);
    }

    loop {
        let pass1 = prompt_passphrase("Enter new passphrase: ")?;
        if pass1.len() < MIN_PASSPHRASE_LEN {
            println!(
                "Passphrase must be at least {} characters. Please try again.",
                MIN_PASSPHRASE_LEN
            );
            continue;
        }

        let pass2 = prompt_passphrase("Confirm passphrase: ")?;
        if *pass1 != *pass2 {
            println!("Passphrases do not match. Please try again.");
            continue;
        }

        return Ok(pass1);
    }
}

fn read_passphrase(prompt: &str) -> StowawayResult<SecureString> {
    match passphrase_from_env() {
        Some(passphrase) => Ok(passphrase),
        None => prompt_passphrase(prompt),
    }
}

fn passphrase_from_env() -> Option<SecureString> {
    std::env::var(PASSPHRASE_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .map(SecureString::from)
}

/// Prompt for a passphrase (hidden input)
fn prompt_passphrase(prompt: &str) -> StowawayResult<SecureString> {
    rpassword::prompt_password(prompt)
        .map(SecureString::from)
        .map_err(|e| StowawayError::Encryption(format!("Failed to read passphrase: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(passphrase: &str) -> Settings {
        let params = KeyDerivationParams::with_costs(1024, 1, 1);
        let key = derive_key(passphrase, &params).unwrap();
        let mut settings = Settings::default();
        settings.encryption.enabled = true;
        settings.encryption.verification_token = Some(encrypt(VERIFY_TOKEN, &key).unwrap());
        settings.encryption.key_params = Some(params);
        settings
    }

    #[test]
    fn test_check_passphrase() {
        let settings = settings_with("correct horse");
        check_passphrase(&settings, "correct horse").unwrap();
        let err = check_passphrase(&settings, "wrong horse").unwrap_err();
        assert!(matches!(err, StowawayError::Encryption(_)));
    }

    #[test]
    fn test_no_token_accepts_any_passphrase() {
        check_passphrase(&Settings::default(), "anything").unwrap();
    }
}
