//! Configuration module for Stowaway
//!
//! - Base directory resolution
//! - User settings persistence

pub mod paths;
pub mod settings;

pub use paths::StowawayPaths;
pub use settings::{EncryptionSettings, Settings};
