//! Backup, recover and inspect CLI commands

use clap::Args;
use std::path::PathBuf;

use super::encrypt::{backup_cipher, recovery_cipher};
use crate::archive::ArchiveAlgorithm;
use crate::backup::{ArtifactKind, BackupManager, BackupOptions};
use crate::compress::CompressionAlgorithm;
use crate::config::settings::Settings;
use crate::crypto::Encryptor;
use crate::display::{format_inspection, format_size};
use crate::error::StowawayResult;

/// Arguments of `stowaway backup`
#[derive(Args)]
pub struct BackupArgs {
    /// Files or directories to back up
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,

    /// Artifact directory, relative to the repository root unless absolute
    #[arg(short, long)]
    pub dest: Option<PathBuf>,

    /// Only back up files whose name matches (wildcards * and ?)
    #[arg(short, long)]
    pub include: Vec<String>,

    /// Skip files and directories whose name matches
    #[arg(short = 'x', long)]
    pub exclude: Vec<String>,

    /// Bundle everything into one archive (basic)
    #[arg(short, long)]
    pub pack: Option<ArchiveAlgorithm>,

    /// Compress the artifact (huffman)
    #[arg(short, long)]
    pub compress: Option<CompressionAlgorithm>,

    /// Compression level, 1 to 9
    #[arg(short, long)]
    pub level: Option<u8>,

    /// Encrypt the artifact with a passphrase
    #[arg(short, long)]
    pub encrypt: bool,

    /// Don't encrypt, even when encryption is enabled in settings
    #[arg(long, conflicts_with = "encrypt")]
    pub no_encrypt: bool,

    /// Only take files directly inside each source directory
    #[arg(long)]
    pub no_recursive: bool,

    /// Follow symbolic links while walking sources
    #[arg(long)]
    pub follow_symlinks: bool,
}

impl BackupArgs {
    /// Build backup options, falling back to settings for anything not given
    pub fn to_options(&self, settings: &Settings) -> BackupOptions {
        let mut options = BackupOptions::new(self.sources.iter().cloned())
            .with_destination(self.dest.clone().unwrap_or_default())
            .with_level(self.level.unwrap_or(settings.compression_level));
        options.recursive = !self.no_recursive;
        options.follow_symlinks = self.follow_symlinks;
        options.include = self.include.clone();
        options.exclude = self.exclude.clone();
        options.pack = self.pack.or(settings.default_pack);

        // Settings defaults only apply where they can: a packed archive or a
        // single mirrored file
        let single_artifact =
            options.pack.is_some() || (self.sources.len() == 1 && self.sources[0].is_file());
        options.compression = self
            .compress
            .or(settings.default_compression.filter(|_| single_artifact));
        options.encrypt = self.encrypt
            || (settings.is_encryption_enabled() && !self.no_encrypt && single_artifact);
        options
    }
}

/// Arguments of `stowaway recover`
#[derive(Args)]
pub struct RecoverArgs {
    /// Record ID (full, bak-xxxxxxxx or prefix) or backed-up file name
    pub record: String,

    /// Restore into this directory instead of next to the original source
    #[arg(short, long)]
    pub to: Option<PathBuf>,

    /// Pick the backup of NAME taken at exactly this time
    #[arg(short, long)]
    pub time: Option<String>,
}

/// Handle `stowaway backup`
pub fn handle_backup_command(
    manager: &mut BackupManager,
    settings: &Settings,
    args: BackupArgs,
) -> StowawayResult<()> {
    let options = args.to_options(settings);
    let cipher = if options.encrypt {
        Some(backup_cipher(settings)?)
    } else {
        None
    };

    let outcome = manager.backup(&options, cipher.as_ref().map(|c| c as &dyn Encryptor))?;

    println!("Backup created: {}", outcome.entry.id);
    println!("  Name:     {}", outcome.entry.file_name);
    println!("  Files:    {} ({})", outcome.files, format_size(outcome.bytes));
    println!("  Stages:   {}", outcome.entry.stages_label());
    println!("  Artifact: {}", outcome.artifact.display());
    Ok(())
}

/// Handle `stowaway recover`
pub fn handle_recover_command(manager: &BackupManager, args: RecoverArgs) -> StowawayResult<()> {
    let entry = manager
        .records()
        .resolve(&args.record, args.time.as_deref())?
        .clone();

    let needs_key = match entry.encrypted {
        Some(flag) => flag,
        None => matches!(
            ArtifactKind::sniff(&entry.artifact_path()),
            Ok(ArtifactKind::Encrypted(_))
        ),
    };
    let cipher = if needs_key {
        Some(recovery_cipher()?)
    } else {
        None
    };

    println!("Recovering {} ({})...", entry.file_name, entry.id);
    let report = manager.recover(
        &entry,
        args.to.as_deref(),
        cipher.as_ref().map(|c| c as &dyn Encryptor),
    )?;
    println!("{}", report.summary());
    Ok(())
}

/// Handle `stowaway inspect`
pub fn handle_inspect_command(artifact: PathBuf) -> StowawayResult<()> {
    print!("{}", format_inspection(&artifact)?);
    Ok(())
}
