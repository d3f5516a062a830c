use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Env {
    temp: TempDir,
}

impl Env {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("data/docs");
        fs::create_dir_all(docs.join("sub")).unwrap();
        fs::write(docs.join("f1.txt"), b"0123456789").unwrap();
        fs::write(docs.join("sub/f2.txt"), b"abcdefghijklmnopqrst").unwrap();
        fs::write(temp.path().join("data/notes.md"), b"# notes\nremember the milk\n").unwrap();
        Self { temp }
    }

    fn home(&self) -> PathBuf {
        self.temp.path().join("home")
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.temp.path().join(rel)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("stowaway").unwrap();
        cmd.env("STOWAWAY_HOME", self.home())
            .env_remove("STOWAWAY_REPO")
            .env_remove("STOWAWAY_PASSPHRASE")
            .env_remove("RUST_LOG");
        cmd
    }

    fn records(&self) -> Vec<serde_json::Value> {
        let raw = fs::read_to_string(self.home().join("records.json")).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    fn artifact(&self, index: usize) -> PathBuf {
        let record = &self.records()[index];
        Path::new(record["destination_dir"].as_str().unwrap())
            .join(record["artifact_name"].as_str().unwrap())
    }

    /// Enable encryption with cheap Argon2 costs and no verification token
    fn enable_cheap_encryption(&self) {
        fs::create_dir_all(self.home()).unwrap();
        let settings = serde_json::json!({
            "encryption": {
                "enabled": true,
                "key_params": {
                    "salt": "",
                    "memory_cost": 1024,
                    "time_cost": 1,
                    "parallelism": 1
                }
            }
        });
        fs::write(self.home().join("config.json"), settings.to_string()).unwrap();
    }
}

#[test]
fn test_config_shows_paths() {
    let env = Env::new();
    env.cmd()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("records.json"))
        .stdout(predicate::str::contains("Pack types:        basic"))
        .stdout(predicate::str::contains("Compression types: huffman"));
}

#[test]
fn test_packed_backup_and_recover() {
    let env = Env::new();
    env.cmd()
        .args(["backup", "--pack", "basic", "--compress", "huffman", "--dest", "daily"])
        .arg(env.path("data/docs"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup created: bak-"))
        .stdout(predicate::str::contains("pack+compress"));

    let artifact = env.artifact(0);
    assert!(artifact.starts_with(env.home().join("repository/daily")));
    assert!(artifact.to_string_lossy().ends_with(".pak.huff"));

    env.cmd()
        .args(["records", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("docs"))
        .stdout(predicate::str::contains("(1 record(s))"));

    let out = env.path("restored");
    env.cmd()
        .args(["recover", "docs", "--to"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored 2 file(s)"));
    assert_eq!(fs::read(out.join("docs/f1.txt")).unwrap(), b"0123456789");
    assert_eq!(fs::read(out.join("docs/sub/f2.txt")).unwrap(), b"abcdefghijklmnopqrst");
}

#[test]
fn test_mirror_backup_with_filters() {
    let env = Env::new();
    env.cmd()
        .args(["backup", "--exclude", "sub"])
        .arg(env.path("data/docs"))
        .assert()
        .success()
        .stdout(predicate::str::contains("mirror"));

    let artifact = env.artifact(0);
    assert!(artifact.is_dir());
    assert!(artifact.join("docs/f1.txt").is_file());
    assert!(!artifact.join("docs/sub").exists());
}

#[test]
fn test_inspect_artifacts() {
    let env = Env::new();
    env.cmd()
        .args(["backup", "--compress", "huffman"])
        .arg(env.path("data/notes.md"))
        .assert()
        .success();

    env.cmd()
        .arg("inspect")
        .arg(env.artifact(0))
        .assert()
        .success()
        .stdout(predicate::str::contains("compressed (huffman)"))
        .stdout(predicate::str::contains("CRC32:"));

    env.cmd()
        .arg("inspect")
        .arg(env.path("data/notes.md"))
        .assert()
        .success()
        .stdout(predicate::str::contains("plain file"));
}

#[test]
fn test_invalid_level_is_rejected() {
    let env = Env::new();
    env.cmd()
        .args(["backup", "--pack", "basic", "--level", "0"])
        .arg(env.path("data/docs"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Compression level"));
    assert!(!env.home().join("records.json").exists());
}

#[test]
fn test_unknown_compression_type() {
    let env = Env::new();
    env.cmd()
        .args(["backup", "--compress", "zstd"])
        .arg(env.path("data/notes.md"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown compression type"));
}

#[test]
fn test_directory_mirror_cannot_be_compressed() {
    let env = Env::new();
    env.cmd()
        .args(["backup", "--compress", "huffman"])
        .arg(env.path("data/docs"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--pack"));
}

#[test]
fn test_missing_source() {
    let env = Env::new();
    env.cmd()
        .arg("backup")
        .arg(env.path("data/nope"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_recover_unknown_record() {
    let env = Env::new();
    env.cmd()
        .args(["recover", "nothing-here"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Backup record not found"));
}

#[test]
fn test_encrypted_backup_round_trip() {
    let env = Env::new();
    env.enable_cheap_encryption();

    env.cmd()
        .env("STOWAWAY_PASSPHRASE", "correct horse battery")
        .args(["backup", "--pack", "basic", "--compress", "huffman"])
        .arg(env.path("data/docs"))
        .assert()
        .success()
        .stdout(predicate::str::contains("pack+compress+encrypt"));
    assert!(env.artifact(0).to_string_lossy().ends_with(".pak.huff.enc"));

    let out = env.path("restored");
    env.cmd()
        .env("STOWAWAY_PASSPHRASE", "wrong horse battery")
        .args(["recover", "docs", "--to"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("decrypting"));
    assert!(!out.join("docs").exists());

    env.cmd()
        .env("STOWAWAY_PASSPHRASE", "correct horse battery")
        .args(["recover", "docs", "--to"])
        .arg(&out)
        .assert()
        .success();
    assert_eq!(fs::read(out.join("docs/f1.txt")).unwrap(), b"0123456789");
}

#[test]
fn test_no_encrypt_overrides_settings() {
    let env = Env::new();
    env.enable_cheap_encryption();
    env.cmd()
        .args(["backup", "--no-encrypt"])
        .arg(env.path("data/notes.md"))
        .assert()
        .success()
        .stdout(predicate::str::contains("mirror"));
}

#[test]
fn test_records_queries_and_delete() {
    let env = Env::new();
    for source in ["data/docs", "data/notes.md"] {
        env.cmd()
            .args(["backup", "--pack", "basic"])
            .arg(env.path(source))
            .assert()
            .success();
    }

    env.cmd()
        .args(["records", "find", "notes.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("notes.md"))
        .stdout(predicate::str::contains("(1 record(s))"));

    env.cmd()
        .args(["records", "search", "DOC"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(1 record(s))"));

    env.cmd()
        .args(["records", "range", "2000-01-01", "2999-12-31"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(2 record(s))"));

    env.cmd()
        .args(["records", "range", "2000-01-01", "2000-12-31"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No backup records found."));

    let id = env.records()[0]["id"].as_str().unwrap().to_string();
    env.cmd()
        .args(["records", "show", &id[..8]])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup: docs"))
        .stdout(predicate::str::contains("Packed:      Yes"));

    let artifact = env.artifact(1);
    env.cmd()
        .args(["records", "delete", "notes.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted record"));
    assert_eq!(env.records().len(), 1);
    assert!(!artifact.exists());

    env.cmd()
        .args(["records", "delete", "notes.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
