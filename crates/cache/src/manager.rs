use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::metadata::ToolchainRecord;

const RECORD_FILE: &str = "toolchain.json";

/// Reads and writes the resolved toolchain record below a cache root.
///
/// Concurrent invocations are not coordinated; the last writer wins.
pub struct ToolchainCache {
    root: PathBuf,
}

impl ToolchainCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn record_path(&self) -> PathBuf {
        self.root.join(RECORD_FILE)
    }

    /// The cached choice, if one exists and parses. A corrupt record is
    /// treated as absent.
    pub fn lookup(&self) -> Option<ToolchainRecord> {
        let path = self.record_path();
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(record) => {
                debug!(record = %path.display(), "using cached toolchain");
                Some(record)
            }
            Err(err) => {
                warn!("ignoring unreadable toolchain record {}: {}", path.display(), err);
                None
            }
        }
    }

    pub fn store(&self, record: &ToolchainRecord) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create cache root {}", self.root.display()))?;
        let path = self.record_path();
        let text = serde_json::to_string_pretty(record)?;
        fs::write(&path, text)
            .with_context(|| format!("failed to write toolchain record {}", path.display()))?;
        Ok(())
    }
}
