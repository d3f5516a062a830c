//! Backup and recovery pipeline
//!
//! A backup selects files from one or more source roots, then runs them
//! through up to three stages, each reading the previous stage's output:
//!
//! - pack: bundle everything into one archive (otherwise mirror the tree)
//! - compress: Huffman-code the single file
//! - encrypt: seal the single file with a passphrase-derived key
//!
//! Every successful backup is recorded in the [`RecordStore`](crate::storage::RecordStore).
//! Recovery reverses the stages, guided by the record's flags or, for
//! records without flags, by the artifact's leading bytes.
//!
//! # Example
//!
//! ```rust,ignore
//! use stowaway::backup::{BackupManager, BackupOptions};
//! use stowaway::archive::ArchiveAlgorithm;
//!
//! let mut manager = BackupManager::new(repo_root, records);
//! let options = BackupOptions::new(["./docs"]).with_pack(ArchiveAlgorithm::Basic);
//! let outcome = manager.backup(&options, None)?;
//!
//! let report = manager.recover(&outcome.entry, Some(Path::new("/tmp/out")), None)?;
//! println!("{}", report.summary());
//! ```

mod artifact;
mod manager;
mod options;
mod restore;
mod select;

pub use artifact::ArtifactKind;
pub use manager::{BackupManager, BackupOutcome};
pub use options::{BackupOptions, COMPRESSION_LEVELS};
pub use restore::{recover, RecoveryReport, RecoveryStage};
pub use select::{pattern_matches, select, Selection, SelectedFile, SourceRoot};
