//! Stowaway - file backup and recovery
//!
//! This library provides the core functionality for the `stowaway` command
//! line tool: selecting files, bundling them into a custom archive format,
//! Huffman-compressing and encrypting the result, and recording every backup
//! so it can be found and recovered later.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `archive`: The multi-file archive container
//! - `compress`: Huffman compression with a CRC32 integrity check
//! - `crypto`: Passphrase-based AES-256-GCM encryption
//! - `backup`: Selection, the backup pipeline and recovery
//! - `storage`: The JSON record store
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//!
//! # Example
//!
//! ```rust,ignore
//! use stowaway::backup::{BackupManager, BackupOptions};
//! use stowaway::config::{paths::StowawayPaths, settings::Settings};
//! use stowaway::storage::RecordStore;
//!
//! let paths = StowawayPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let records = RecordStore::open(paths.records_file())?;
//! let mut manager = BackupManager::new(settings.repository_root(&paths), records);
//! manager.backup(&BackupOptions::new(["notes.txt"]), None)?;
//! ```

pub mod archive;
pub mod backup;
pub mod binio;
pub mod cli;
pub mod compress;
pub mod config;
pub mod crypto;
pub mod display;
pub mod error;
pub mod logging;
pub mod models;
pub mod storage;

pub use error::{StowawayError, StowawayResult};
