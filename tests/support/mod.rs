#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use devday::storage::{Storage, TasksDocument};
use serde_json::Value;
use tempfile::TempDir;

/// A throwaway data directory for one test.
pub struct TestData {
    dir: TempDir,
}

impl TestData {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn storage(&self) -> Storage {
        Storage::new(self.dir.path())
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join("devday.toml");
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn read_tasks(&self) -> TasksDocument {
        self.storage().load_tasks().expect("tasks document")
    }

    /// The devday binary pointed at this data directory.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("devday").expect("binary");
        cmd.env("DEVDAY_DIR", self.dir.path());
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Run with `--json` and return the `data` member of the envelope.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self
            .cmd()
            .args(args)
            .arg("--json")
            .output()
            .expect("run devday");
        assert!(
            output.status.success(),
            "devday {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stdout)
        );
        let envelope: Value = serde_json::from_slice(&output.stdout).expect("json envelope");
        assert_eq!(envelope["status"], "success");
        envelope["data"].clone()
    }
}
