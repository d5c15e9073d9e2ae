//! Keeper Ensemble: bootstrap and upkeep of a quorum coordination ensemble.
//!
//! Assigns stable member ids, tracks peer endpoints, keeps CA material and
//! keystores for the client and quorum TLS scopes, and derives the
//! coordination service's effective configuration. [`EnsembleNode`] is the
//! single actor that drives all of it from discrete events.

pub mod audit;
pub mod error;
pub mod keystore;
pub mod material;
pub mod policy;
pub mod registry;
pub mod render;
pub mod service;
pub mod settings;
pub mod state;
pub mod synth;
pub mod transport;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use keeper_common::install::{install_bytes, FileOwnership};
use keeper_crypto::pinning;
use serde::Serialize;
use tokio::sync::broadcast;

pub use error::EnsembleError;
pub use keystore::{Keystore, KeystoreSynthesizer, StoreKind, StorePackager};
pub use material::{CertificateGenerator, KeyMaterial, MaterialProvider, MaterialScope};
pub use policy::{SecurityPolicy, TlsMode};
pub use registry::{ClusterMember, Endpoint, EnsembleSnapshot, MemberId, Registry};
pub use render::{ConfigKind, ConfigSink};
pub use service::ServiceControl;
pub use settings::NodeSettings;
pub use synth::{BlockReason, ConfigSet, Synthesis, Synthesizer};
pub use transport::RelationTransport;

use audit::AuditLog;
use material::MaterialChange;
use registry::PeerUpdate;
use state::NodeState;
use synth::SynthesisInputs;

/// Capacity for the ensemble event broadcast channel.
const BROADCAST_CHANNEL_CAPACITY: usize = 256;

/// Events emitted as membership, stores and configuration change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsembleEvent {
    MemberJoined { id: MemberId, endpoint: Endpoint },
    MemberDeparted { id: MemberId },
    SelfIdAssigned { id: MemberId },
    StoreRotated {
        scope: MaterialScope,
        kind: StoreKind,
        path: PathBuf,
    },
    ConfigCommitted { digest: String, members: usize },
}

/// User-visible outcome of the latest cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeStatus {
    Active { message: String },
    /// Expected to clear on a later event.
    Waiting { reason: String },
    /// Needs the operator or the service to act.
    Blocked { reason: String },
}

impl NodeStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    fn waiting(reason: impl fmt::Display) -> Self {
        Self::Waiting {
            reason: reason.to_string(),
        }
    }

    fn blocked(reason: impl fmt::Display) -> Self {
        Self::Blocked {
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active { message } => write!(f, "active: {message}"),
            Self::Waiting { reason } => write!(f, "waiting: {reason}"),
            Self::Blocked { reason } => write!(f, "blocked: {reason}"),
        }
    }
}

/// External collaborators of a node.
pub struct Collaborators {
    /// Relation shared with the other ensemble members.
    pub peers: Box<dyn RelationTransport>,
    /// Relation with client applications, if any.
    pub clients: Option<Box<dyn RelationTransport>>,
    pub sink: Box<dyn ConfigSink>,
    pub service: Box<dyn ServiceControl>,
    pub generator: Box<dyn CertificateGenerator>,
    pub packager: Box<dyn StorePackager>,
}

/// What a membership sync saw on the peer relation.
#[derive(Default)]
struct PeerView {
    conflicts: Vec<EnsembleError>,
    peer_certs: Vec<String>,
}

// ── EnsembleNode ────────────────────────────────────

/// The single actor owning one node's ensemble state.
///
/// Every handler takes `&mut self`, so handlers never overlap.
pub struct EnsembleNode {
    settings: NodeSettings,
    registry: Registry,
    materials: MaterialProvider,
    stores: KeystoreSynthesizer,
    peers: Box<dyn RelationTransport>,
    clients: Option<Box<dyn RelationTransport>>,
    sink: Box<dyn ConfigSink>,
    service: Box<dyn ServiceControl>,
    audit: AuditLog,
    /// Unit that announced each remote member id.
    owners: BTreeMap<MemberId, String>,
    /// Departed ids, with the unit that owned each, while that unit still
    /// claims the id on the relation.
    departed: BTreeMap<MemberId, Option<String>>,
    committed: Option<String>,
    status: NodeStatus,
    event_tx: broadcast::Sender<EnsembleEvent>,
}

impl EnsembleNode {
    /// Open a node: load persisted state and adopt an existing `myid`.
    pub fn open(settings: NodeSettings, collaborators: Collaborators) -> Result<Self, EnsembleError> {
        settings.validate()?;

        let state_dir = settings.paths.state_dir.clone();
        let state = NodeState::load(&state_dir)?;

        let registry = Registry::new(settings.expected_size, settings.self_endpoint());
        if let Some(id) = read_myid(&settings.paths.myid_file())? {
            registry.adopt_self_id(id)?;
            tracing::info!(member_id = %id, "Adopted member id from myid file");
        }

        let materials = MaterialProvider::new(collaborators.generator, settings.service_name.clone())
            .with_store(state.materials);
        let mut stores = KeystoreSynthesizer::new(collaborators.packager, &settings.paths.staging_dir)
            .with_records(state.stores);
        stores.set_ownership(settings.ownership);

        Ok(Self {
            registry,
            materials,
            stores,
            peers: collaborators.peers,
            clients: collaborators.clients,
            sink: collaborators.sink,
            service: collaborators.service,
            audit: AuditLog::new(&state_dir),
            owners: BTreeMap::new(),
            departed: BTreeMap::new(),
            committed: state.committed,
            status: NodeStatus::waiting("not reconciled yet"),
            event_tx: broadcast::channel(BROADCAST_CHANNEL_CAPACITY).0,
            settings,
        })
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn status(&self) -> &NodeStatus {
        &self.status
    }

    pub fn snapshot(&self) -> EnsembleSnapshot {
        self.registry.snapshot()
    }

    pub fn self_id(&self) -> Option<MemberId> {
        self.registry.self_id()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnsembleEvent> {
        self.event_tx.subscribe()
    }

    /// Descriptor of an installed store, if one was built.
    pub fn store(&self, scope: MaterialScope, kind: StoreKind) -> Option<&Keystore> {
        self.stores.current(scope, kind)
    }

    // ── Event handlers ──────────────────────────────────────────────

    pub fn on_peer_joined(&mut self, unit: &str) -> NodeStatus {
        tracing::debug!(unit, "Peer joined");
        self.reconcile()
    }

    pub fn on_peer_changed(&mut self, unit: &str) -> NodeStatus {
        tracing::debug!(unit, "Peer changed");
        self.reconcile()
    }

    /// A peer left. With a known id the member is dropped right away, even
    /// while its stale announcement is still visible.
    pub fn on_peer_departed(&mut self, id: Option<MemberId>) -> NodeStatus {
        if let Some(id) = id {
            if self.registry.self_id() == Some(id) {
                tracing::warn!(member_id = %id, "Ignoring departure of this node's own id");
            } else {
                let owner = self.owners.remove(&id);
                self.departed.insert(id, owner);
                if self.registry.remove_peer(id).is_some() {
                    tracing::info!(member_id = %id, "Member departed");
                    self.emit(EnsembleEvent::MemberDeparted { id });
                }
            }
        }
        self.reconcile()
    }

    /// Apply new settings. The unit name and systemd unit are bound to the
    /// collaborators at open time and cannot change while running.
    pub fn on_config_changed(&mut self, settings: NodeSettings) -> NodeStatus {
        if let Err(e) = settings
            .validate()
            .and_then(|()| check_bindings(&self.settings, &settings))
        {
            tracing::warn!(error = %e, "Rejected configuration change");
            self.status = NodeStatus::blocked(&e);
            return self.status.clone();
        }

        self.registry.set_self_endpoint(settings.self_endpoint());
        self.registry.set_expected_size(settings.expected_size);
        self.stores.set_ownership(settings.ownership);
        self.stores.set_staging_dir(&settings.paths.staging_dir);
        if settings.paths.state_dir != self.settings.paths.state_dir {
            tracing::info!(state_dir = %settings.paths.state_dir.display(), "State directory moved");
            self.audit = AuditLog::new(&settings.paths.state_dir);
        }
        self.settings = settings;

        self.reconcile()
    }

    /// Run one full cycle and persist the node state.
    pub fn reconcile(&mut self) -> NodeStatus {
        let status = match self.cycle() {
            Ok(status) => status,
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "Reconcile deferred");
                NodeStatus::waiting(&e)
            }
            Err(e) => {
                tracing::error!(error = %e, "Reconcile failed");
                NodeStatus::blocked(&e)
            }
        };

        self.flush_rotations();
        if let Err(e) = self.save_state() {
            tracing::warn!(error = %e, "Failed to persist node state");
        }

        match &status {
            NodeStatus::Active { message } => tracing::info!(%message, "Node active"),
            NodeStatus::Waiting { reason } => tracing::info!(%reason, "Node waiting"),
            NodeStatus::Blocked { reason } => tracing::warn!(%reason, "Node blocked"),
        }
        self.status = status.clone();
        status
    }

    /// Refresh membership and report status without assigning, rendering
    /// or publishing anything.
    pub fn observe(&mut self) -> Result<NodeStatus, EnsembleError> {
        let view = self.sync_membership()?;
        if let Some(conflict) = view.conflicts.first() {
            return Ok(NodeStatus::waiting(conflict));
        }
        let snapshot = self.registry.snapshot();
        if !snapshot.is_ready() {
            return Ok(NodeStatus::waiting(awaiting(&snapshot)));
        }
        Ok(self.service_status())
    }

    // ── Reconcile steps ─────────────────────────────────────────────

    fn cycle(&mut self) -> Result<NodeStatus, EnsembleError> {
        let view = self.sync_membership()?;
        self.ensure_self_id()?;

        if let Some(conflict) = view.conflicts.first() {
            return Ok(NodeStatus::waiting(conflict));
        }

        let policy = self.settings.policy();
        let mut resolved: BTreeMap<MaterialScope, KeyMaterial> = BTreeMap::new();
        let mut material_error = None;
        for scope in MaterialScope::ALL {
            if !policy.tls_enabled(scope) {
                continue;
            }
            match self.resolve_scope(scope, &policy) {
                Ok(Some(material)) => {
                    resolved.insert(scope, material);
                }
                Ok(None) => {}
                Err(
                    e @ (EnsembleError::IncompleteMaterial { .. }
                    | EnsembleError::Decode(_)
                    | EnsembleError::Certificate(_)),
                ) => {
                    tracing::warn!(scope = %scope, error = %e, "Key material unusable");
                    material_error.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(e) = material_error {
            return Ok(NodeStatus::blocked(&e));
        }

        let snapshot = self.registry.snapshot();
        let synthesis = Synthesizer::new(&self.settings).synthesize(
            SynthesisInputs {
                ensemble: &snapshot,
                client: resolved.get(&MaterialScope::Client),
                quorum: resolved.get(&MaterialScope::Quorum),
                policy: &policy,
                peer_certs: &view.peer_certs,
            },
            &mut self.stores,
            self.peers.as_ref(),
        )?;
        self.announce_to_clients(&policy, resolved.get(&MaterialScope::Client))?;

        let config = match synthesis {
            Synthesis::Ready(config) => config,
            Synthesis::Blocked(reason) => return Ok(NodeStatus::waiting(reason)),
        };

        self.commit(&config, snapshot.members.len())?;
        Ok(self.service_status())
    }

    /// Pull peer announcements into the registry.
    ///
    /// A remote member lives as long as the unit that announced it still
    /// claims that id. Members whose owner stopped claiming are dropped
    /// before new claims are applied, so another unit may take the id over.
    fn sync_membership(&mut self) -> Result<PeerView, EnsembleError> {
        let units = self.peers.read_all()?;
        let mut view = PeerView::default();

        let mut claims = Vec::new();
        for (unit, data) in &units {
            let (Some(raw_id), Some(raw_endpoint)) =
                (data.get(transport::KEY_MYID), data.get(transport::KEY_ENDPOINT))
            else {
                tracing::debug!(unit = %unit, "Peer has not announced itself yet");
                continue;
            };
            match (raw_id.parse::<MemberId>(), raw_endpoint.parse::<Endpoint>()) {
                (Ok(id), Ok(endpoint)) => {
                    claims.push((unit.as_str(), id, endpoint, data.get(transport::KEY_TLS_CERT)));
                }
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(unit = %unit, error = %e, "Ignoring malformed peer announcement");
                }
            }
        }
        let claims_id = |unit: &str, id: MemberId| {
            claims.iter().any(|(u, claimed, _, _)| *u == unit && *claimed == id)
        };

        let orphaned: Vec<MemberId> = self
            .registry
            .snapshot()
            .remote_members()
            .map(|m| m.id)
            .filter(|id| {
                !self
                    .owners
                    .get(id)
                    .is_some_and(|owner| claims_id(owner, *id))
            })
            .collect();
        for id in orphaned {
            self.owners.remove(&id);
            if self.registry.remove_peer(id).is_some() {
                tracing::info!(member_id = %id, "Member no longer announced");
                self.emit(EnsembleEvent::MemberDeparted { id });
            }
        }
        self.owners.retain(|id, owner| claims_id(owner, *id));
        self.departed.retain(|id, owner| match owner {
            Some(owner) => claims_id(owner, *id),
            None => claims.iter().any(|(_, claimed, _, _)| claimed == id),
        });

        for (unit, id, endpoint, cert) in &claims {
            let (unit, id) = (*unit, *id);
            let stale = self
                .departed
                .get(&id)
                .is_some_and(|owner| match owner {
                    Some(owner) => owner == unit,
                    None => true,
                });
            if stale {
                continue;
            }
            if let Some(cert) = cert {
                view.peer_certs.push(cert.to_string());
            }

            let same_unit = self.owners.get(&id).is_some_and(|owner| owner == unit);
            let result = if same_unit {
                self.registry.replace_peer(id, endpoint.clone())
            } else {
                self.registry.record_peer(id, endpoint.clone())
            };

            match result {
                Ok(PeerUpdate::Added) => {
                    self.owners.insert(id, unit.to_string());
                    tracing::info!(member_id = %id, endpoint = %endpoint, unit = %unit, "Member joined");
                    self.emit(EnsembleEvent::MemberJoined {
                        id,
                        endpoint: endpoint.clone(),
                    });
                }
                Ok(PeerUpdate::Updated { previous }) => {
                    tracing::info!(member_id = %id, from = %previous, to = %endpoint, "Member endpoint changed");
                    self.emit(EnsembleEvent::MemberJoined {
                        id,
                        endpoint: endpoint.clone(),
                    });
                }
                Ok(PeerUpdate::Unchanged) => {
                    self.owners.entry(id).or_insert_with(|| unit.to_string());
                }
                Err(e) => {
                    tracing::warn!(unit = %unit, error = %e, "Membership conflict");
                    view.conflicts.push(e);
                }
            }
        }

        Ok(view)
    }

    /// Assign the self id if needed, keep `myid` on disk and announce.
    fn ensure_self_id(&mut self) -> Result<MemberId, EnsembleError> {
        let assigned_before = self.registry.self_id().is_some();
        let id = self.registry.assign_self_id();
        if !assigned_before {
            let member_id = id.to_string();
            self.audit
                .record("member_id_assigned", &[("member_id", member_id.as_str())]);
            self.emit(EnsembleEvent::SelfIdAssigned { id });
        }

        write_myid(&self.settings.paths.myid_file(), id, &self.settings.ownership)?;

        self.peers.publish(transport::KEY_MYID, &id.to_string())?;
        self.peers.publish(
            transport::KEY_ENDPOINT,
            &self.registry.self_endpoint().to_string(),
        )?;
        Ok(id)
    }

    /// Resolve one scope's material and keep its keystore current.
    fn resolve_scope(
        &mut self,
        scope: MaterialScope,
        policy: &SecurityPolicy,
    ) -> Result<Option<KeyMaterial>, EnsembleError> {
        let resolution = self.materials.resolve(scope, policy)?;
        if resolution.change.is_change() {
            let event = match resolution.change {
                MaterialChange::Generated => "material_generated",
                MaterialChange::Cleared => "material_cleared",
                _ => "material_replaced",
            };
            let fingerprint = resolution
                .material
                .as_ref()
                .map(KeyMaterial::fingerprint)
                .unwrap_or_default();
            self.audit.record(
                event,
                &[("scope", scope.as_str()), ("fingerprint", fingerprint.as_str())],
            );
        }

        if let Some(material) = &resolution.material {
            let path = keystore_path(&self.settings, scope).to_path_buf();
            self.stores.ensure_keystore(material, scope, &path)?;
        }
        Ok(resolution.material)
    }

    /// Tell client applications how to reach and trust this node.
    fn announce_to_clients(
        &self,
        policy: &SecurityPolicy,
        client: Option<&KeyMaterial>,
    ) -> Result<(), EnsembleError> {
        let Some(clients) = &self.clients else {
            return Ok(());
        };
        let port = self.settings.network.client_port.to_string();
        clients.publish(transport::KEY_CLIENT_PORT, &port)?;

        let truststore = self.stores.current(MaterialScope::Client, StoreKind::Truststore);
        match (policy.client_tls_enabled, client, truststore) {
            (true, Some(material), Some(truststore)) => {
                clients.withdraw(transport::KEY_TLS)?;
                clients.publish(transport::KEY_TLS_CERT, material.certificate_pem())?;
                clients.publish(
                    transport::KEY_TRUSTSTORE_PATH,
                    &truststore.path.display().to_string(),
                )?;
                clients.publish(transport::KEY_TRUSTSTORE_PASSWORD, truststore.password())?;
            }
            (true, _, _) => {
                // TLS is on but the truststore is not built yet.
                clients.withdraw(transport::KEY_TLS)?;
            }
            (false, _, _) => {
                clients.publish(transport::KEY_TLS, "disabled")?;
                clients.withdraw(transport::KEY_TLS_CERT)?;
                clients.withdraw(transport::KEY_TRUSTSTORE_PATH)?;
                clients.withdraw(transport::KEY_TRUSTSTORE_PASSWORD)?;
            }
        }
        Ok(())
    }

    /// Render and restart when the configuration or stores changed.
    fn commit(&mut self, config: &ConfigSet, members: usize) -> Result<(), EnsembleError> {
        let logging = synth::logging_config(&self.settings);
        let digest = pinning::fingerprint_fields([
            config.digest(),
            logging.digest(),
            self.stores.digest(),
        ]);
        if self.committed.as_deref() == Some(digest.as_str()) {
            tracing::debug!("Configuration unchanged");
            return Ok(());
        }

        self.sink.render(ConfigKind::Service, config)?;
        self.sink.render(ConfigKind::Logging, &logging)?;

        let unit = self.service.unit().to_string();
        if let Err(e) = self.service.reload() {
            tracing::debug!(unit = %unit, error = %e, "Service reload failed");
        }
        if let Err(e) = self.service.restart() {
            tracing::warn!(unit = %unit, error = %e, "Service restart failed");
        }

        let member_count = members.to_string();
        self.audit.record(
            "config_committed",
            &[("digest", digest.as_str()), ("members", member_count.as_str())],
        );
        tracing::info!(digest = %digest, members, "Configuration committed");
        self.committed = Some(digest.clone());
        self.emit(EnsembleEvent::ConfigCommitted { digest, members });
        Ok(())
    }

    fn service_status(&self) -> NodeStatus {
        let unit = self.service.unit();
        if self.service.is_running() {
            NodeStatus::Active {
                message: format!("{unit} running"),
            }
        } else {
            NodeStatus::blocked(format!("service not running {unit}"))
        }
    }

    fn flush_rotations(&mut self) {
        for store in self.stores.take_rotations() {
            let kind = store.kind.to_string();
            let path = store.path.display().to_string();
            self.audit.record(
                "store_rotated",
                &[
                    ("scope", store.scope.as_str()),
                    ("kind", kind.as_str()),
                    ("path", path.as_str()),
                ],
            );
            self.emit(EnsembleEvent::StoreRotated {
                scope: store.scope,
                kind: store.kind,
                path: store.path.clone(),
            });
        }
    }

    fn save_state(&self) -> Result<(), std::io::Error> {
        NodeState {
            materials: self.materials.store().clone(),
            stores: self.stores.records(),
            committed: self.committed.clone(),
        }
        .save(&self.settings.paths.state_dir)
    }

    fn emit(&self, event: EnsembleEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

fn awaiting(snapshot: &EnsembleSnapshot) -> BlockReason {
    if snapshot.self_id.is_none() {
        BlockReason::SelfIdUnassigned
    } else {
        BlockReason::AwaitingQuorum {
            have: snapshot.members.len(),
            need: snapshot.expected_size,
        }
    }
}

/// Reject changes to settings the collaborators were opened with.
fn check_bindings(current: &NodeSettings, next: &NodeSettings) -> Result<(), EnsembleError> {
    let fixed = [
        ("unit_name", &current.unit_name, &next.unit_name),
        ("systemd_unit", &current.systemd_unit, &next.systemd_unit),
    ];
    match fixed.iter().find(|(_, before, after)| before != after) {
        Some((name, before, after)) => Err(EnsembleError::InvalidSettings(format!(
            "{name} cannot change from {before:?} to {after:?} without reopening the node"
        ))),
        None => Ok(()),
    }
}

fn keystore_path(settings: &NodeSettings, scope: MaterialScope) -> &Path {
    match scope {
        MaterialScope::Quorum => &settings.tls.quorum_keystore_path,
        MaterialScope::Client => &settings.tls.keystore_path,
    }
}

fn read_myid(path: &Path) -> Result<Option<MemberId>, EnsembleError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => raw.parse().map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `myid` unless it already holds `id`.
fn write_myid(path: &Path, id: MemberId, ownership: &FileOwnership) -> Result<(), EnsembleError> {
    if read_myid(path).ok().flatten() == Some(id) {
        return Ok(());
    }
    install_bytes(path, format!("{id}\n").as_bytes(), ownership)?;
    tracing::info!(member_id = %id, path = %path.display(), "myid written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(
            NodeStatus::Active {
                message: "confluent-zookeeper running".to_string()
            }
            .to_string(),
            "active: confluent-zookeeper running"
        );
        assert_eq!(
            NodeStatus::waiting(BlockReason::AwaitingQuorum { have: 1, need: 3 }).to_string(),
            "waiting: awaiting quorum bootstrap (1/3 members)"
        );
    }

    #[test]
    fn status_serializes_with_state_tag() {
        let json = serde_json::to_value(NodeStatus::blocked("service not running zk")).unwrap();
        assert_eq!(json["state"], "blocked");
        assert_eq!(json["reason"], "service not running zk");
    }

    #[test]
    fn bound_settings_cannot_change() {
        let current = NodeSettings::default();
        let mut next = current.clone();
        next.expected_size = 5;
        next.paths.state_dir = PathBuf::from("/srv/keeper/state");
        assert!(check_bindings(&current, &next).is_ok());

        next.unit_name = "zookeeper/9".to_string();
        let err = check_bindings(&current, &next).unwrap_err();
        assert!(matches!(err, EnsembleError::InvalidSettings(_)));
        assert!(err.to_string().contains("unit_name"));
    }

    #[test]
    fn myid_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("myid");
        assert_eq!(read_myid(&path).unwrap(), None);

        let id = MemberId::new(3).unwrap();
        write_myid(&path, id, &FileOwnership::default()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "3\n");
        assert_eq!(read_myid(&path).unwrap(), Some(id));
    }

    #[test]
    fn corrupt_myid_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("myid");
        std::fs::write(&path, "zero").unwrap();
        assert!(matches!(
            read_myid(&path),
            Err(EnsembleError::InvalidMemberId(_))
        ));
    }
}
