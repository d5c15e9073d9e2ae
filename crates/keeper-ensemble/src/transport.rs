//! Relation data exchange between units.
//!
//! Each unit publishes a flat key/value map and reads every other unit's
//! map. Delivery is eventually consistent; readers must tolerate any
//! order and repeated announcements.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use keeper_common::persist;
use serde::{Deserialize, Serialize};

use crate::error::EnsembleError;

pub const KEY_MYID: &str = "myid";
pub const KEY_ENDPOINT: &str = "endpoint";
pub const KEY_TLS_CERT: &str = "tls_cert";

pub const KEY_TRUSTSTORE_PATH: &str = "truststore_path";
pub const KEY_TRUSTSTORE_PASSWORD: &str = "truststore_pwd";
pub const KEY_CLIENT_PORT: &str = "client_port";
pub const KEY_TLS: &str = "tls";

/// One unit's published data.
pub type UnitData = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("relation directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("relation data for {unit}: {source}")]
    Publish {
        unit: String,
        source: std::io::Error,
    },
}

impl From<TransportError> for EnsembleError {
    fn from(e: TransportError) -> Self {
        EnsembleError::Transport(e.to_string())
    }
}

/// Key/value exchange with the other units of a relation.
pub trait RelationTransport: Send + Sync {
    /// Name of the local unit.
    fn unit(&self) -> &str;

    fn publish(&self, key: &str, value: &str) -> Result<(), EnsembleError>;

    fn withdraw(&self, key: &str) -> Result<(), EnsembleError>;

    /// Data of every other unit, keyed by unit name.
    fn read_all(&self) -> Result<BTreeMap<String, UnitData>, EnsembleError>;
}

/// In-process relation shared by several [`MemoryTransport`]s.
#[derive(Debug, Clone, Default)]
pub struct RelationBus {
    units: Arc<Mutex<BTreeMap<String, UnitData>>>,
}

impl RelationBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, UnitData>> {
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a unit to the relation.
    pub fn join(&self, unit: impl Into<String>) -> MemoryTransport {
        let unit = unit.into();
        self.lock().entry(unit.clone()).or_default();
        MemoryTransport {
            bus: self.clone(),
            unit,
        }
    }

    /// Detach a unit together with everything it published.
    pub fn leave(&self, unit: &str) {
        self.lock().remove(unit);
    }

    /// Write a value on behalf of `unit`.
    pub fn set(&self, unit: &str, key: &str, value: &str) {
        self.lock()
            .entry(unit.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn data(&self, unit: &str) -> Option<UnitData> {
        self.lock().get(unit).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct MemoryTransport {
    bus: RelationBus,
    unit: String,
}

impl RelationTransport for MemoryTransport {
    fn unit(&self) -> &str {
        &self.unit
    }

    fn publish(&self, key: &str, value: &str) -> Result<(), EnsembleError> {
        self.bus.set(&self.unit, key, value);
        Ok(())
    }

    fn withdraw(&self, key: &str) -> Result<(), EnsembleError> {
        if let Some(data) = self.bus.lock().get_mut(&self.unit) {
            data.remove(key);
        }
        Ok(())
    }

    fn read_all(&self) -> Result<BTreeMap<String, UnitData>, EnsembleError> {
        Ok(self
            .bus
            .lock()
            .iter()
            .filter(|(unit, _)| **unit != self.unit)
            .map(|(unit, data)| (unit.clone(), data.clone()))
            .collect())
    }
}

/// On-disk record of one unit.
#[derive(Debug, Default, Serialize, Deserialize)]
struct UnitFile {
    unit: String,
    #[serde(default)]
    data: UnitData,
}

/// Relation exchange through a shared directory, one JSON file per unit.
#[derive(Debug, Clone)]
pub struct FileTransport {
    dir: PathBuf,
    unit: String,
}

impl FileTransport {
    pub fn new(dir: impl Into<PathBuf>, unit: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            unit: unit.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn own_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(&self.unit)))
    }

    fn load_own(&self) -> Result<UnitFile, TransportError> {
        let path = self.own_path();
        let mut file: UnitFile =
            persist::read_json_or_default(&path).map_err(|source| TransportError::Publish {
                unit: self.unit.clone(),
                source,
            })?;
        file.unit = self.unit.clone();
        Ok(file)
    }

    fn store_own(&self, file: &UnitFile) -> Result<(), TransportError> {
        persist::write_json_pretty(&self.own_path(), file).map_err(|source| {
            TransportError::Publish {
                unit: self.unit.clone(),
                source,
            }
        })
    }
}

impl RelationTransport for FileTransport {
    fn unit(&self) -> &str {
        &self.unit
    }

    fn publish(&self, key: &str, value: &str) -> Result<(), EnsembleError> {
        let mut file = self.load_own()?;
        if file.data.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        file.data.insert(key.to_string(), value.to_string());
        self.store_own(&file)?;
        tracing::debug!(unit = %self.unit, key, "Relation data published");
        Ok(())
    }

    fn withdraw(&self, key: &str) -> Result<(), EnsembleError> {
        let mut file = self.load_own()?;
        if file.data.remove(key).is_some() {
            self.store_own(&file)?;
        }
        Ok(())
    }

    fn read_all(&self) -> Result<BTreeMap<String, UnitData>, EnsembleError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(TransportError::Directory {
                    path: self.dir.clone(),
                    source,
                }
                .into())
            }
        };

        let own = self.own_path();
        let mut units = BTreeMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path == own || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match persist::read_json::<UnitFile>(&path) {
                Ok(file) if file.unit != self.unit => {
                    units.insert(file.unit, file.data);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable relation data");
                }
            }
        }
        Ok(units)
    }
}

/// Unit names look like `zookeeper/0`; keep them filesystem-safe.
fn file_stem(unit: &str) -> String {
    unit.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_units_see_each_other_but_not_themselves() {
        let bus = RelationBus::new();
        let a = bus.join("zookeeper/0");
        let b = bus.join("zookeeper/1");

        a.publish(KEY_MYID, "1").unwrap();
        b.publish(KEY_MYID, "2").unwrap();

        let seen_by_a = a.read_all().unwrap();
        assert_eq!(seen_by_a.len(), 1);
        assert_eq!(seen_by_a["zookeeper/1"][KEY_MYID], "2");
        assert!(!seen_by_a.contains_key("zookeeper/0"));
    }

    #[test]
    fn memory_leave_removes_unit_data() {
        let bus = RelationBus::new();
        let a = bus.join("zookeeper/0");
        let b = bus.join("zookeeper/1");
        b.publish(KEY_ENDPOINT, "h1:2888:3888").unwrap();

        bus.leave("zookeeper/1");
        assert!(a.read_all().unwrap().is_empty());
    }

    #[test]
    fn memory_withdraw_drops_key() {
        let bus = RelationBus::new();
        let a = bus.join("zookeeper/0");
        a.publish(KEY_TLS_CERT, "pem").unwrap();
        a.withdraw(KEY_TLS_CERT).unwrap();
        assert!(bus.data("zookeeper/0").unwrap().is_empty());
    }

    #[test]
    fn file_units_exchange_data() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileTransport::new(dir.path(), "zookeeper/0");
        let b = FileTransport::new(dir.path(), "zookeeper/1");

        a.publish(KEY_MYID, "1").unwrap();
        a.publish(KEY_ENDPOINT, "h0:2888:3888").unwrap();
        b.publish(KEY_MYID, "2").unwrap();

        let seen_by_b = b.read_all().unwrap();
        assert_eq!(seen_by_b.len(), 1);
        assert_eq!(seen_by_b["zookeeper/0"][KEY_ENDPOINT], "h0:2888:3888");
        assert!(dir.path().join("zookeeper-0.json").exists());
    }

    #[test]
    fn file_read_all_tolerates_missing_dir_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FileTransport::new(dir.path().join("absent"), "zookeeper/0");
        assert!(missing.read_all().unwrap().is_empty());

        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let t = FileTransport::new(dir.path(), "zookeeper/0");
        assert!(t.read_all().unwrap().is_empty());
    }

    #[test]
    fn file_withdraw_drops_key() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileTransport::new(dir.path(), "zookeeper/0");
        let b = FileTransport::new(dir.path(), "zookeeper/1");
        a.publish(KEY_TLS_CERT, "pem").unwrap();
        a.withdraw(KEY_TLS_CERT).unwrap();
        assert!(!b.read_all().unwrap()["zookeeper/0"].contains_key(KEY_TLS_CERT));
    }

    #[test]
    fn unit_names_are_sanitised() {
        assert_eq!(file_stem("zookeeper/0"), "zookeeper-0");
        assert_eq!(file_stem("zk.a_b-1"), "zk.a_b-1");
    }
}
