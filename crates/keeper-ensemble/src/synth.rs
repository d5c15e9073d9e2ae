//! Effective configuration synthesis.
//!
//! Turns a membership snapshot, the key material of both scopes and the
//! security policy into the property set of the coordination service.
//! Keystores are ensured before their paths and passwords are read, so a
//! `Ready` result never names a store that is missing or stale.

use std::collections::BTreeMap;
use std::fmt;

use keeper_crypto::pinning;
use serde::Serialize;

use crate::error::EnsembleError;
use crate::keystore::KeystoreSynthesizer;
use crate::material::{self, KeyMaterial, MaterialScope};
use crate::policy::SecurityPolicy;
use crate::registry::{EnsembleSnapshot, Endpoint, MemberId};
use crate::settings::NodeSettings;
use crate::transport::{self, RelationTransport};

const NETTY_CNXN_FACTORY: &str = "org.apache.zookeeper.server.NettyServerCnxnFactory";
const X509_AUTH_PROVIDER: &str = "org.apache.zookeeper.server.auth.X509AuthenticationProvider";
const SERVER_PREFIX: &str = "server.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Text(String),
    Int(i64),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<u16> for ConfigValue {
    fn from(n: u16) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        Self::Text(b.to_string())
    }
}

/// An immutable-once-built key/value configuration.
///
/// Server entries are kept apart so they render in numeric id order
/// (`server.2` before `server.10`) after the general keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigSet {
    entries: BTreeMap<String, ConfigValue>,
    servers: Vec<(MemberId, Endpoint)>,
}

impl ConfigSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    /// Value as text, server entries included.
    pub fn value(&self, key: &str) -> Option<String> {
        if let Some(v) = self.entries.get(key) {
            return Some(v.to_string());
        }
        let id: MemberId = key.strip_prefix(SERVER_PREFIX)?.parse().ok()?;
        self.servers
            .iter()
            .find(|(server, _)| *server == id)
            .map(|(_, endpoint)| endpoint.to_string())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    pub fn servers(&self) -> &[(MemberId, Endpoint)] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries in render order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .chain(
                self.servers
                    .iter()
                    .map(|(id, endpoint)| (format!("{SERVER_PREFIX}{id}"), endpoint.to_string())),
            )
            .collect()
    }

    /// `key=value` lines, newline-terminated.
    pub fn to_properties(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.entries() {
            out.push_str(&key);
            out.push('=');
            out.push_str(&value);
            out.push('\n');
        }
        out
    }

    pub fn digest(&self) -> String {
        pinning::fingerprint_sha256(self.to_properties().as_bytes())
    }
}

/// Why no configuration could be emitted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    AwaitingQuorum { have: usize, need: usize },
    SelfIdUnassigned,
    MissingMaterial { scope: MaterialScope },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingQuorum { have, need } => {
                write!(f, "awaiting quorum bootstrap ({have}/{need} members)")
            }
            Self::SelfIdUnassigned => f.write_str("awaiting quorum bootstrap (member id not assigned)"),
            Self::MissingMaterial { scope } => {
                write!(f, "{scope} TLS is enabled but no key material is available")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Synthesis {
    Ready(ConfigSet),
    Blocked(BlockReason),
}

impl Synthesis {
    pub fn ready(self) -> Option<ConfigSet> {
        match self {
            Self::Ready(config) => Some(config),
            Self::Blocked(_) => None,
        }
    }
}

/// Everything a synthesis reads.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInputs<'a> {
    pub ensemble: &'a EnsembleSnapshot,
    pub client: Option<&'a KeyMaterial>,
    pub quorum: Option<&'a KeyMaterial>,
    pub policy: &'a SecurityPolicy,
    /// Quorum certificates announced by peers.
    pub peer_certs: &'a [String],
}

pub struct Synthesizer<'a> {
    settings: &'a NodeSettings,
}

impl<'a> Synthesizer<'a> {
    pub fn new(settings: &'a NodeSettings) -> Self {
        Self { settings }
    }

    /// Build the coordination-service configuration.
    ///
    /// With quorum TLS on, this node's quorum certificate is announced to
    /// peers first, even while blocked: peers need it to finish
    /// bootstrapping.
    pub fn synthesize(
        &self,
        inputs: SynthesisInputs<'_>,
        stores: &mut KeystoreSynthesizer,
        peers: &dyn RelationTransport,
    ) -> Result<Synthesis, EnsembleError> {
        let mode = inputs.policy.mode();

        match (mode.quorum_tls(), inputs.quorum) {
            (true, Some(quorum)) => peers.publish(transport::KEY_TLS_CERT, quorum.certificate_pem())?,
            (true, None) => {}
            (false, _) => peers.withdraw(transport::KEY_TLS_CERT)?,
        }

        let ensemble = inputs.ensemble;
        if ensemble.self_id.is_none() {
            return Ok(Synthesis::Blocked(BlockReason::SelfIdUnassigned));
        }
        if !ensemble.is_ready() {
            return Ok(Synthesis::Blocked(BlockReason::AwaitingQuorum {
                have: ensemble.members.len(),
                need: ensemble.expected_size,
            }));
        }

        let client = match (mode.client_tls(), inputs.client) {
            (true, None) => {
                return Ok(Synthesis::Blocked(BlockReason::MissingMaterial {
                    scope: MaterialScope::Client,
                }))
            }
            (true, Some(m)) => Some(m),
            (false, _) => None,
        };
        let quorum = match (mode.quorum_tls(), inputs.quorum) {
            (true, None) => {
                return Ok(Synthesis::Blocked(BlockReason::MissingMaterial {
                    scope: MaterialScope::Quorum,
                }))
            }
            (true, Some(m)) => Some(m),
            (false, _) => None,
        };

        let mut config = ConfigSet::new();
        self.general_section(&mut config);
        self.client_section(&mut config, client, stores)?;
        self.quorum_section(&mut config, quorum, inputs.peer_certs, stores)?;
        config.servers = ensemble
            .members
            .iter()
            .map(|m| (m.id, m.endpoint.clone()))
            .collect();

        Ok(Synthesis::Ready(config))
    }

    fn general_section(&self, config: &mut ConfigSet) {
        for (key, value) in &self.settings.properties {
            if key.starts_with(SERVER_PREFIX) {
                tracing::warn!(key = %key, "Ignoring server entry from extra properties");
                continue;
            }
            config.insert(key.as_str(), value.as_str());
        }
        config.insert("dataDir", self.settings.paths.data_dir.display().to_string());
        config.insert(
            "dataLogDir",
            self.settings.paths.data_log_dir.display().to_string(),
        );
    }

    fn client_section(
        &self,
        config: &mut ConfigSet,
        material: Option<&KeyMaterial>,
        stores: &mut KeystoreSynthesizer,
    ) -> Result<(), EnsembleError> {
        let port = self.settings.network.client_port;
        let Some(material) = material else {
            config.insert("clientPort", port);
            config.insert("ssl.clientAuth", "none");
            config.insert("sslQuorum", false);
            return Ok(());
        };

        let tls = &self.settings.tls;
        let keystore = stores.ensure_keystore(material, MaterialScope::Client, &tls.keystore_path)?;
        let truststore =
            stores.ensure_truststore(MaterialScope::Client, &material.trust_anchors()?, &tls.truststore_path)?;

        config.insert("secureClientPort", port);
        config.insert("serverCnxnFactory", NETTY_CNXN_FACTORY);
        config.insert("authProvider.x509", X509_AUTH_PROVIDER);
        config.insert("ssl.clientAuth", "need");
        config.insert("ssl.keyStore.location", keystore.path.display().to_string());
        config.insert("ssl.keyStore.password", keystore.password());
        config.insert("ssl.trustStore.location", truststore.path.display().to_string());
        config.insert("ssl.trustStore.password", truststore.password());
        config.insert("sslQuorum", false);
        Ok(())
    }

    fn quorum_section(
        &self,
        config: &mut ConfigSet,
        material: Option<&KeyMaterial>,
        peer_certs: &[String],
        stores: &mut KeystoreSynthesizer,
    ) -> Result<(), EnsembleError> {
        let Some(material) = material else {
            return Ok(());
        };

        let tls = &self.settings.tls;
        let keystore =
            stores.ensure_keystore(material, MaterialScope::Quorum, &tls.quorum_keystore_path)?;

        let mut anchors = material.trust_anchors()?;
        for cert in peer_certs {
            match material::trust_anchors_of(cert) {
                Ok(peer_anchors) => anchors.extend(peer_anchors),
                Err(e) => tracing::warn!(error = %e, "Skipping unparsable peer certificate"),
            }
        }
        let truststore =
            stores.ensure_truststore(MaterialScope::Quorum, &anchors, &tls.quorum_truststore_path)?;

        config.insert("serverCnxnFactory", NETTY_CNXN_FACTORY);
        config.insert("ssl.quorum.keyStore.location", keystore.path.display().to_string());
        config.insert("ssl.quorum.keyStore.password", keystore.password());
        config.insert("ssl.quorum.trustStore.location", truststore.path.display().to_string());
        config.insert("ssl.quorum.trustStore.password", truststore.password());
        config.insert("sslQuorum", true);
        Ok(())
    }
}

/// log4j configuration of the coordination service.
pub fn logging_config(settings: &NodeSettings) -> ConfigSet {
    let mut config = ConfigSet::new();
    config.insert("log4j.rootLogger", settings.logging.root_logger.as_str());

    config.insert("log4j.appender.stdout", "org.apache.log4j.ConsoleAppender");
    config.insert("log4j.appender.stdout.layout", "org.apache.log4j.PatternLayout");
    config.insert(
        "log4j.appender.stdout.layout.ConversionPattern",
        "[%d] %p %m (%c)%n",
    );

    config.insert("log4j.appender.zkAppender", "org.apache.log4j.DailyRollingFileAppender");
    config.insert("log4j.appender.zkAppender.DatePattern", "'.'yyyy-MM-dd-HH");
    config.insert(
        "log4j.appender.zkAppender.File",
        settings.paths.log_dir.join("zookeeper-server.log").display().to_string(),
    );
    config.insert("log4j.appender.zkAppender.layout", "org.apache.log4j.PatternLayout");
    config.insert(
        "log4j.appender.zkAppender.layout.ConversionPattern",
        "[%d] %p %m (%c)%n",
    );
    config
}
