//! Persistence layer.
//!
//! Saves and loads per-account engine state. `JsonFileStore` keeps one JSON
//! document per account under a state directory; `MemoryStore` is the
//! in-process store used by tests.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::state::AccountState;

/// Load/save seam for account state.
pub trait StateStore: Send + Sync {
    /// Returns `None` for an account that has never been saved.
    fn load(&self, account_id: &str) -> Result<Option<AccountState>>;

    fn save(&self, account_id: &str, state: &AccountState) -> Result<()>;
}

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

/// One `<dir>/<account_id>.json` file per account.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .context(format!("Failed to create state directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, account_id: &str) -> PathBuf {
        self.dir.join(format!("{account_id}.json"))
    }

    /// Delete an account's state file (for testing or reset).
    pub fn delete(&self, account_id: &str) -> Result<()> {
        let path = self.path_for(account_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .context(format!("Failed to delete state file {}", path.display()))?;
        }
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn load(&self, account_id: &str) -> Result<Option<AccountState>> {
        let path = self.path_for(account_id);

        if !Path::new(&path).exists() {
            info!(account = account_id, path = %path.display(), "No saved state found, starting fresh");
            return Ok(None);
        }

        let json = std::fs::read_to_string(&path)
            .context(format!("Failed to read state from {}", path.display()))?;

        let state: AccountState = serde_json::from_str(&json)
            .context(format!("Failed to parse state from {}", path.display()))?;

        info!(account = account_id, path = %path.display(), state = %state, "State loaded from disk");
        Ok(Some(state))
    }

    /// Write to a sibling temp file, then rename over the target so a
    /// crash never leaves a half-written document.
    fn save(&self, account_id: &str, state: &AccountState) -> Result<()> {
        let path = self.path_for(account_id);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(state).context("Failed to serialise account state")?;

        std::fs::write(&tmp, &json)
            .context(format!("Failed to write state to {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .context(format!("Failed to move state into {}", path.display()))?;

        debug!(account = account_id, path = %path.display(), "State saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    states: Mutex<HashMap<String, AccountState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self, account_id: &str) -> Result<Option<AccountState>> {
        let states = self.states.lock().map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        Ok(states.get(account_id).cloned())
    }

    fn save(&self, account_id: &str, state: &AccountState) -> Result<()> {
        let mut states = self.states.lock().map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        states.insert(account_id.to_string(), state.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
