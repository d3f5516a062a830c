//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup layer.

pub mod backup;
pub mod encrypt;
pub mod records;

pub use backup::{
    handle_backup_command, handle_inspect_command, handle_recover_command, BackupArgs,
    RecoverArgs,
};
pub use encrypt::{handle_encrypt_command, EncryptCommands, PASSPHRASE_ENV};
pub use records::{handle_records_command, RecordsCommands};
