//! Core data models for Stowaway

pub mod entry;
pub mod ids;

pub use entry::{format_backup_time, new_artifact_stem, BackupEntry, BACKUP_TIME_FORMAT};
pub use ids::EntryId;
