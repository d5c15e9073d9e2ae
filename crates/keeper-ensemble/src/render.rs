//! Rendering of synthesized configuration to disk.

use std::path::{Path, PathBuf};

use keeper_common::install::{install_bytes, FileOwnership};

use crate::error::EnsembleError;
use crate::synth::ConfigSet;

const HEADER: &str = "# Managed by keeper. Local changes are overwritten.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    /// The coordination service's own properties file.
    Service,
    /// Its log4j configuration.
    Logging,
}

/// Accepts a finished configuration for one target.
pub trait ConfigSink: Send + Sync {
    fn render(&self, kind: ConfigKind, config: &ConfigSet) -> Result<(), EnsembleError>;
}

/// Writes `key=value` properties files atomically.
#[derive(Debug, Clone)]
pub struct PropertiesFileSink {
    config_file: PathBuf,
    log4j_file: PathBuf,
    ownership: FileOwnership,
}

impl PropertiesFileSink {
    pub fn new(config_file: impl Into<PathBuf>, log4j_file: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            log4j_file: log4j_file.into(),
            ownership: FileOwnership::default(),
        }
    }

    pub fn with_ownership(mut self, ownership: FileOwnership) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn target(&self, kind: ConfigKind) -> &Path {
        match kind {
            ConfigKind::Service => &self.config_file,
            ConfigKind::Logging => &self.log4j_file,
        }
    }
}

impl ConfigSink for PropertiesFileSink {
    fn render(&self, kind: ConfigKind, config: &ConfigSet) -> Result<(), EnsembleError> {
        let target = self.target(kind);
        let body = format!("{HEADER}{}", config.to_properties());
        install_bytes(target, body.as_bytes(), &self.ownership)?;

        tracing::info!(path = %target.display(), entries = config.len(), "Configuration rendered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_each_kind_to_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PropertiesFileSink::new(
            dir.path().join("zookeeper.properties"),
            dir.path().join("log4j.properties"),
        );

        let mut service = ConfigSet::new();
        service.insert("dataDir", "/var/lib/zookeeper");
        service.insert("clientPort", 2182u16);
        sink.render(ConfigKind::Service, &service).unwrap();

        let mut logging = ConfigSet::new();
        logging.insert("log4j.rootLogger", "INFO, stdout");
        sink.render(ConfigKind::Logging, &logging).unwrap();

        let props = std::fs::read_to_string(dir.path().join("zookeeper.properties")).unwrap();
        assert!(props.starts_with("# Managed by keeper"));
        assert!(props.contains("clientPort=2182\ndataDir=/var/lib/zookeeper\n"));

        let log4j = std::fs::read_to_string(dir.path().join("log4j.properties")).unwrap();
        assert!(log4j.contains("log4j.rootLogger=INFO, stdout\n"));
    }
}
