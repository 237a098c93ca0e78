//! Per-chain checkpoint file.
//!
//! Each chain directory holds a `cursor.json` recording the last block the
//! scanner has inspected, so the next cycle only scans the delta.

use std::path::Path;

use anyhow::{Context, Result};
use ccip_cache::BlockNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const FILE_NAME: &str = "cursor.json";
const TMP_FILE_NAME: &str = "cursor.json.tmp";

/// Scan progress for a single chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Chain head observed by the last successful scan.
    pub last_block: BlockNumber,
    /// When the cursor was written.
    pub synced_at: DateTime<Utc>,
}

impl Cursor {
    /// Create a cursor at `last_block` stamped with the current time.
    #[must_use]
    pub fn now(last_block: BlockNumber) -> Self {
        Self {
            last_block,
            synced_at: Utc::now(),
        }
    }

    /// Read the cursor from `<dir>/cursor.json`.
    ///
    /// Returns `None` if the file does not exist (chain never scanned).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    /// A corrupt cursor never falls back to the genesis block.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&data)
            .map(Some)
            .with_context(|| format!("parsing {}", path.display()))
    }

    /// Persist the cursor to `<dir>/cursor.json` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

        let path = dir.join(FILE_NAME);
        let tmp = dir.join(TMP_FILE_NAME);

        std::fs::write(&tmp, serde_json::to_string_pretty(self)?.as_bytes())
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;

        Ok(())
    }
}
