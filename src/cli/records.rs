//! Record CLI commands
//!
//! Implements CLI commands for querying and deleting backup records.

use clap::Subcommand;

use crate::display::record::{format_record_details, format_record_list};
use crate::error::StowawayResult;
use crate::storage::RecordStore;

/// Record subcommands
#[derive(Subcommand)]
pub enum RecordsCommands {
    /// List all backup records
    List,
    /// Records whose file name is exactly NAME
    Find {
        /// Backed-up file or directory name
        name: String,
    },
    /// Records whose name or source path contains TEXT (case-insensitive)
    Search {
        /// Text to look for
        text: String,
    },
    /// Records taken between two times (inclusive)
    Range {
        /// Start, e.g. 2025-03-01 or 2025-03-01T10:00:00.000Z
        start: String,
        /// End, e.g. 2025-03-31
        end: String,
    },
    /// Show record details
    Show {
        /// Record ID or name
        record: String,
    },
    /// Delete a record and its artifact
    Delete {
        /// Record ID or name
        record: String,
        /// Pick the backup of NAME taken at exactly this time
        #[arg(short, long)]
        time: Option<String>,
    },
}

/// Handle a records command
pub fn handle_records_command(records: &mut RecordStore, cmd: RecordsCommands) -> StowawayResult<()> {
    match cmd {
        RecordsCommands::List => {
            println!("{}", format_record_list(records.entries()));
        }
        RecordsCommands::Find { name } => {
            println!("{}", format_record_list(records.find_by_name(&name)));
        }
        RecordsCommands::Search { text } => {
            println!("{}", format_record_list(records.search(&text)));
        }
        RecordsCommands::Range { start, end } => {
            let end = range_end(&end);
            println!("{}", format_record_list(records.find_by_time_range(&start, &end)));
        }
        RecordsCommands::Show { record } => {
            let entry = records.resolve(&record, None)?;
            print!("{}", format_record_details(entry));
        }
        RecordsCommands::Delete { record, time } => {
            let id = records.resolve(&record, time.as_deref())?.id;
            let removed = records.delete_by_id(id)?;
            println!(
                "Deleted record {} ({} @ {})",
                removed.id, removed.file_name, removed.backup_time
            );
        }
    }

    Ok(())
}

/// Widen a date-only upper bound to cover the whole day
fn range_end(end: &str) -> String {
    if end.len() == 10 {
        format!("{}T23:59:59.999Z", end)
    } else {
        end.to_string()
    }
}
