//! Backup record display formatting
//!
//! Formats backup records for terminal output in table and detail views.

use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::format_size_opt;
use crate::models::BackupEntry;

/// One line of the records table
#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Stages")]
    stages: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Artifact")]
    artifact: String,
}

impl From<&BackupEntry> for RecordRow {
    fn from(entry: &BackupEntry) -> Self {
        let size = std::fs::metadata(entry.artifact_path())
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len());
        Self {
            id: entry.id.to_string(),
            name: entry.file_name.clone(),
            time: entry.backup_time.clone(),
            stages: entry.stages_label(),
            size: format_size_opt(size),
            artifact: entry.artifact_path().display().to_string(),
        }
    }
}

/// Format backup records as a table
pub fn format_record_list<'a>(entries: impl IntoIterator<Item = &'a BackupEntry>) -> String {
    let rows: Vec<RecordRow> = entries.into_iter().map(RecordRow::from).collect();
    if rows.is_empty() {
        return "No backup records found.".to_string();
    }
    let count = rows.len();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    format!("{table}\n({} record(s))", count)
}

/// Format a single record's details
pub fn format_record_details(entry: &BackupEntry) -> String {
    let flag = |value: Option<bool>| match value {
        Some(true) => "Yes",
        Some(false) => "No",
        None => "Unknown",
    };

    let mut output = String::new();
    output.push_str(&format!("Backup: {}\n", entry.file_name));
    output.push_str(&format!("  ID:          {}\n", entry.id.as_uuid()));
    output.push_str(&format!("  Time:        {}\n", entry.backup_time));
    output.push_str(&format!("  Source:      {}\n", entry.source_path.display()));
    for extra in &entry.additional_sources {
        output.push_str(&format!("               {}\n", extra.display()));
    }
    output.push_str(&format!("  Destination: {}\n", entry.dest_dir.display()));
    output.push_str(&format!("  Artifact:    {}\n", entry.artifact_name));
    output.push_str(&format!("  Packed:      {}\n", flag(entry.packed)));
    output.push_str(&format!("  Compressed:  {}\n", flag(entry.compressed)));
    output.push_str(&format!("  Encrypted:   {}\n", flag(entry.encrypted)));
    if let Some(checksum) = &entry.checksum {
        output.push_str(&format!("  CRC32:       {}\n", checksum));
    }
    if !entry.artifact_path().exists() {
        output.push_str("  Warning:     artifact is missing\n");
    }
    output
}
