//! Storage layer for Stowaway
//!
//! JSON file storage with atomic writes and the backup record store.

pub mod file_io;
pub mod records;

pub use file_io::{read_json, write_json_atomic};
pub use records::RecordStore;
