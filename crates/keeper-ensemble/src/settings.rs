//! Node settings.
//!
//! Every field has a default so a partial configuration file works.

use std::collections::BTreeMap;
use std::path::PathBuf;

use keeper_common::install::FileOwnership;
use keeper_common::paths;
use serde::{Deserialize, Serialize};

use crate::error::EnsembleError;
use crate::policy::{ExternalMaterial, SecurityPolicy};
use crate::registry::Endpoint;

pub const DEFAULT_CLIENT_PORT: u16 = 2182;
pub const DEFAULT_PEER_PORT: u16 = 2888;
pub const DEFAULT_LEADER_PORT: u16 = 3888;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Service name used in generated CA names.
    pub service_name: String,
    /// systemd unit of the coordination service.
    pub systemd_unit: String,
    /// Name of this unit on the relation, e.g. `zookeeper/0`.
    pub unit_name: String,
    /// Target ensemble size.
    pub expected_size: usize,
    pub network: NetworkSettings,
    pub paths: PathSettings,
    pub tls: TlsSettings,
    pub ownership: FileOwnership,
    pub logging: LoggingSettings,
    /// Extra coordination-service properties. Computed keys win.
    pub properties: BTreeMap<String, String>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            service_name: "zookeeper".to_string(),
            systemd_unit: "confluent-zookeeper".to_string(),
            unit_name: "zookeeper/0".to_string(),
            expected_size: 1,
            network: NetworkSettings::default(),
            paths: PathSettings::default(),
            tls: TlsSettings::default(),
            ownership: FileOwnership::default(),
            logging: LoggingSettings::default(),
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Address peers use to reach this node. Empty means "detect".
    pub host: String,
    pub client_port: u16,
    pub peer_port: u16,
    pub leader_port: u16,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            client_port: DEFAULT_CLIENT_PORT,
            peer_port: DEFAULT_PEER_PORT,
            leader_port: DEFAULT_LEADER_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub data_dir: PathBuf,
    pub data_log_dir: PathBuf,
    /// Node state and audit log.
    pub state_dir: PathBuf,
    /// Parent of the temporary directories used while packaging stores.
    pub staging_dir: PathBuf,
    pub config_file: PathBuf,
    pub log4j_file: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/zookeeper"),
            data_log_dir: PathBuf::from("/var/lib/zookeeper-log"),
            state_dir: paths::keeper_state_dir(),
            staging_dir: std::env::temp_dir(),
            config_file: PathBuf::from("/etc/kafka/zookeeper.properties"),
            log4j_file: PathBuf::from("/etc/kafka/zookeeper-log4j.properties"),
            log_dir: PathBuf::from("/var/log/zookeeper"),
        }
    }
}

impl PathSettings {
    pub fn myid_file(&self) -> PathBuf {
        self.data_dir.join("myid")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    pub client_tls: bool,
    pub quorum_tls: bool,
    pub generate_root_ca: bool,
    /// Base64-encoded PEM, empty when not supplied.
    pub ssl_cert: String,
    pub ssl_key: String,
    pub ssl_quorum_cert: String,
    pub ssl_quorum_key: String,
    pub keystore_path: PathBuf,
    pub truststore_path: PathBuf,
    pub quorum_keystore_path: PathBuf,
    pub quorum_truststore_path: PathBuf,
}

impl Default for TlsSettings {
    fn default() -> Self {
        let ssl = paths::ssl_private_dir();
        Self {
            client_tls: false,
            quorum_tls: false,
            generate_root_ca: true,
            ssl_cert: String::new(),
            ssl_key: String::new(),
            ssl_quorum_cert: String::new(),
            ssl_quorum_key: String::new(),
            keystore_path: ssl.join("zookeeper_ssl_ks.p12"),
            truststore_path: ssl.join("zookeeper_ssl_ts.p12"),
            quorum_keystore_path: ssl.join("zookeeper_quorum_ks.p12"),
            quorum_truststore_path: ssl.join("zookeeper_quorum_ts.p12"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub root_logger: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            root_logger: "INFO, stdout, zkAppender".to_string(),
        }
    }
}

impl NodeSettings {
    pub fn validate(&self) -> Result<(), EnsembleError> {
        if self.expected_size == 0 {
            return Err(EnsembleError::InvalidSettings(
                "expected_size must be at least 1".to_string(),
            ));
        }
        if self.network.host.trim().is_empty() {
            return Err(EnsembleError::InvalidSettings(
                "network.host is empty".to_string(),
            ));
        }
        let ports = [
            ("client_port", self.network.client_port),
            ("peer_port", self.network.peer_port),
            ("leader_port", self.network.leader_port),
        ];
        if let Some((name, _)) = ports.iter().find(|(_, port)| *port == 0) {
            return Err(EnsembleError::InvalidSettings(format!(
                "network.{name} must not be 0"
            )));
        }
        if self.unit_name.trim().is_empty() {
            return Err(EnsembleError::InvalidSettings("unit_name is empty".to_string()));
        }
        Ok(())
    }

    /// Endpoint this node announces to its peers.
    pub fn self_endpoint(&self) -> Endpoint {
        Endpoint::new(
            self.network.host.trim(),
            self.network.peer_port,
            self.network.leader_port,
        )
    }

    pub fn policy(&self) -> SecurityPolicy {
        SecurityPolicy {
            client_tls_enabled: self.tls.client_tls,
            quorum_tls_enabled: self.tls.quorum_tls,
            generate_root_ca: self.tls.generate_root_ca,
            client_external: external(&self.tls.ssl_cert, &self.tls.ssl_key),
            quorum_external: external(&self.tls.ssl_quorum_cert, &self.tls.ssl_quorum_key),
        }
    }
}

fn external(cert: &str, key: &str) -> ExternalMaterial {
    let present = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());
    ExternalMaterial {
        certificate: present(cert),
        private_key: present(key),
    }
}
