//! Configuration file loading.

use std::path::{Path, PathBuf};

use anyhow::Context;
use keeper_ensemble::NodeSettings;
use serde::Deserialize;

/// Top-level layout of `keeper.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    #[serde(flatten)]
    pub node: NodeSettings,
    pub relation: RelationSettings,
}

/// Directories backing the file-based relations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelationSettings {
    /// Shared by every member of the ensemble.
    pub peers_dir: PathBuf,
    /// Shared with client applications. Unset disables announcements.
    pub clients_dir: Option<PathBuf>,
}

impl Default for RelationSettings {
    fn default() -> Self {
        Self {
            peers_dir: keeper_common::paths::keeper_state_dir()
                .join("relation")
                .join("peers"),
            clients_dir: None,
        }
    }
}

impl KeeperConfig {
    /// Read and parse a configuration file.
    ///
    /// A missing file at the default location yields the defaults; a
    /// missing file named explicitly is an error.
    pub fn load(path: &Path, explicit: bool) -> anyhow::Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                tracing::debug!(path = %path.display(), "No configuration file, using defaults");
                String::new()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading configuration {}", path.display()))
            }
        };
        let mut config = Self::parse(&raw)
            .with_context(|| format!("parsing configuration {}", path.display()))?;
        config.fill_host()?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// An empty host is replaced by this machine's hostname.
    fn fill_host(&mut self) -> anyhow::Result<()> {
        if !self.node.network.host.trim().is_empty() {
            return Ok(());
        }
        let host = hostname::get().context("detecting hostname")?;
        self.node.network.host = host.to_string_lossy().into_owned();
        tracing::debug!(host = %self.node.network.host, "Using detected hostname");
        Ok(())
    }
}
