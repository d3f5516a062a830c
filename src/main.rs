use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use stowaway::archive::ArchiveAlgorithm;
use stowaway::backup::BackupManager;
use stowaway::cli::{
    handle_backup_command, handle_encrypt_command, handle_inspect_command, handle_records_command,
    handle_recover_command, BackupArgs, EncryptCommands, RecordsCommands, RecoverArgs,
};
use stowaway::compress::CompressionAlgorithm;
use stowaway::config::{paths::StowawayPaths, settings::Settings};
use stowaway::logging;
use stowaway::storage::RecordStore;

#[derive(Parser)]
#[command(
    name = "stowaway",
    author = "Kaylee Beyene",
    version,
    about = "File backup and recovery with packing, Huffman compression and encryption",
    long_about = "Stowaway backs up files and directories into a local repository, \
                  either as a mirrored tree or as a single packed archive that can be \
                  Huffman-compressed and encrypted, and keeps a record of every backup \
                  so it can be recovered later."
)]
struct Cli {
    /// Repository root for relative backup destinations
    #[arg(long, global = true, env = "STOWAWAY_REPO")]
    repo: Option<PathBuf>,

    /// Log filter, e.g. "info" or "stowaway=debug" (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up files or directories
    Backup(BackupArgs),

    /// Restore a recorded backup
    #[command(alias = "restore")]
    Recover(RecoverArgs),

    /// Query and delete backup records
    #[command(subcommand, alias = "record")]
    Records(RecordsCommands),

    /// Describe an artifact from its headers
    Inspect {
        /// Path of the artifact
        artifact: PathBuf,
    },

    /// Encryption management commands
    #[command(subcommand)]
    Encrypt(EncryptCommands),

    /// Show current configuration and paths
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize paths and settings
    let paths = StowawayPaths::new()?;
    let mut settings = Settings::load_or_create(&paths)?;

    logging::init(cli.log_level.as_deref().unwrap_or(&settings.log_level))?;

    let repository_root = cli
        .repo
        .clone()
        .unwrap_or_else(|| settings.repository_root(&paths));

    match cli.command {
        Some(Commands::Backup(args)) => {
            let mut manager = open_manager(&paths, repository_root)?;
            handle_backup_command(&mut manager, &settings, args)?;
        }
        Some(Commands::Recover(args)) => {
            let manager = open_manager(&paths, repository_root)?;
            handle_recover_command(&manager, args)?;
        }
        Some(Commands::Records(cmd)) => {
            let mut records = RecordStore::open(paths.records_file())?;
            handle_records_command(&mut records, cmd)?;
        }
        Some(Commands::Inspect { artifact }) => {
            handle_inspect_command(artifact)?;
        }
        Some(Commands::Encrypt(cmd)) => {
            handle_encrypt_command(&paths, &mut settings, cmd)?;
        }
        Some(Commands::Config) => {
            println!("Stowaway Configuration");
            println!("======================");
            println!("Base directory:  {}", paths.base_dir().display());
            println!("Settings file:   {}", paths.settings_file().display());
            println!("Records file:    {}", paths.records_file().display());
            println!("Repository root: {}", repository_root.display());
            println!();
            println!("Settings:");
            println!(
                "  Default pack:        {}",
                settings.default_pack.map_or("none (mirror)", |a| a.name())
            );
            println!(
                "  Default compression: {}",
                settings.default_compression.map_or("none", |a| a.name())
            );
            println!("  Compression level:   {}", settings.compression_level);
            println!("  Log level:           {}", settings.log_level);
            println!("  Encryption enabled:  {}", settings.is_encryption_enabled());
            println!();
            println!("Supported:");
            println!("  Pack types:        {}", ArchiveAlgorithm::supported_names().join(", "));
            println!(
                "  Compression types: {}",
                CompressionAlgorithm::supported_names().join(", ")
            );
        }
        None => {
            println!("Stowaway - file backup and recovery");
            println!();
            println!("Run 'stowaway --help' for usage information.");
        }
    }

    Ok(())
}

fn open_manager(paths: &StowawayPaths, repository_root: PathBuf) -> Result<BackupManager> {
    paths.ensure_directories()?;
    let records = RecordStore::open(paths.records_file())?;
    Ok(BackupManager::new(repository_root, records))
}
