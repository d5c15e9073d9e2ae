//! Persisted node state.

use std::path::{Path, PathBuf};

use keeper_common::persist;
use serde::{Deserialize, Serialize};

use crate::keystore::Keystore;
use crate::material::MaterialStore;

const STATE_FILENAME: &str = "keeper-state.json";

/// What must survive a restart for material and stores to stay stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeState {
    pub materials: MaterialStore,
    pub stores: Vec<Keystore>,
    /// Fingerprint of the last configuration handed to the renderer.
    pub committed: Option<String>,
}

pub fn state_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATE_FILENAME)
}

impl NodeState {
    /// Load the state file, or an empty state if there is none yet.
    pub fn load(state_dir: &Path) -> Result<Self, std::io::Error> {
        persist::read_json_or_default(&state_path(state_dir))
    }

    /// Written owner-only: the file holds private keys and passwords.
    pub fn save(&self, state_dir: &Path) -> Result<(), std::io::Error> {
        persist::write_json_pretty(&state_path(state_dir), self)
    }
}
