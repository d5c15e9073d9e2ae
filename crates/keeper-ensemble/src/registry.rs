//! Ensemble membership registry.
//!
//! Assigns this node's member id, aggregates peer endpoint announcements
//! and answers whether the ensemble is large enough to render a server
//! listing. All state sits behind one mutex: id assignment, peer upserts
//! and the readiness check are each a single critical section.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::EnsembleError;

/// Stable, positive identifier of a node within the ensemble (`myid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MemberId(u32);

impl MemberId {
    /// Returns `None` for zero; member ids start at 1.
    pub fn new(raw: u32) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for MemberId {
    type Error = EnsembleError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| EnsembleError::InvalidMemberId(raw.to_string()))
    }
}

impl From<MemberId> for u32 {
    fn from(id: MemberId) -> Self {
        id.0
    }
}

impl FromStr for MemberId {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| EnsembleError::InvalidMemberId(s.to_string()))
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Peer endpoint in `host:peerPort:leaderPort` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    peer_port: u16,
    leader_port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, peer_port: u16, leader_port: u16) -> Self {
        Self {
            host: host.into(),
            peer_port,
            leader_port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn peer_port(&self) -> u16 {
        self.peer_port
    }

    pub fn leader_port(&self) -> u16 {
        self.leader_port
    }
}

impl FromStr for Endpoint {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EnsembleError::InvalidEndpoint(s.to_string());

        // Split from the right: an IPv6 host keeps its own colons.
        let mut parts = s.trim().rsplitn(3, ':');
        let leader = parts.next().ok_or_else(invalid)?;
        let peer = parts.next().ok_or_else(invalid)?;
        let host = parts.next().ok_or_else(invalid)?;

        if host.is_empty() {
            return Err(invalid());
        }
        let peer_port: u16 = peer.parse().map_err(|_| invalid())?;
        let leader_port: u16 = leader.parse().map_err(|_| invalid())?;
        if peer_port == 0 || leader_port == 0 {
            return Err(invalid());
        }

        Ok(Self::new(host, peer_port, leader_port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EnsembleError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(e: Endpoint) -> Self {
        e.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.peer_port, self.leader_port)
    }
}

/// Whether a member entry describes this node or a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberOrigin {
    Local,
    Remote,
}

/// One node of the ensemble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub id: MemberId,
    pub endpoint: Endpoint,
    pub origin: MemberOrigin,
}

/// Outcome of a peer upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerUpdate {
    Added,
    Updated { previous: Endpoint },
    Unchanged,
}

impl PeerUpdate {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Mutable ensemble state, owned exclusively by [`Registry`].
#[derive(Debug)]
struct EnsembleState {
    expected_size: usize,
    self_id: Option<MemberId>,
    self_endpoint: Endpoint,
    members: BTreeMap<MemberId, ClusterMember>,
}

impl EnsembleState {
    fn is_ready(&self) -> bool {
        self.self_id.is_some() && self.members.len() >= self.expected_size
    }

    /// Smallest positive integer not already held by a member.
    fn lowest_free_id(&self) -> MemberId {
        let mut candidate = 1u32;
        for id in self.members.keys() {
            if id.get() != candidate {
                break;
            }
            candidate += 1;
        }
        MemberId(candidate)
    }

    fn upsert_remote(
        &mut self,
        id: MemberId,
        endpoint: Endpoint,
        replace: bool,
    ) -> Result<PeerUpdate, EnsembleError> {
        match self.members.get_mut(&id) {
            None => {
                self.members.insert(
                    id,
                    ClusterMember {
                        id,
                        endpoint,
                        origin: MemberOrigin::Remote,
                    },
                );
                Ok(PeerUpdate::Added)
            }
            Some(existing) if existing.endpoint == endpoint => Ok(PeerUpdate::Unchanged),
            Some(existing) if replace && existing.origin == MemberOrigin::Remote => {
                let previous = std::mem::replace(&mut existing.endpoint, endpoint);
                Ok(PeerUpdate::Updated { previous })
            }
            Some(existing) => Err(EnsembleError::Conflict {
                id,
                existing: existing.endpoint.clone(),
                proposed: endpoint,
            }),
        }
    }
}

/// Read-only copy of the ensemble, members ordered by ascending id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnsembleSnapshot {
    pub expected_size: usize,
    pub self_id: Option<MemberId>,
    pub members: Vec<ClusterMember>,
}

impl EnsembleSnapshot {
    /// True iff self has an id and the member count meets the target size.
    pub fn is_ready(&self) -> bool {
        self.self_id.is_some() && self.members.len() >= self.expected_size
    }

    pub fn member(&self, id: MemberId) -> Option<&ClusterMember> {
        self.members
            .binary_search_by_key(&id, |m| m.id)
            .ok()
            .map(|i| &self.members[i])
    }

    pub fn remote_members(&self) -> impl Iterator<Item = &ClusterMember> {
        self.members
            .iter()
            .filter(|m| m.origin == MemberOrigin::Remote)
    }
}

/// Thread-safe membership registry.
pub struct Registry {
    state: Mutex<EnsembleState>,
}

impl Registry {
    pub fn new(expected_size: usize, self_endpoint: Endpoint) -> Self {
        Self {
            state: Mutex::new(EnsembleState {
                expected_size: expected_size.max(1),
                self_id: None,
                self_endpoint,
                members: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EnsembleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assign this node's member id, or return the one already assigned.
    ///
    /// The id is the smallest positive integer not held by any known
    /// member. Once assigned it never changes.
    pub fn assign_self_id(&self) -> MemberId {
        let mut state = self.lock();
        if let Some(id) = state.self_id {
            return id;
        }

        let id = state.lowest_free_id();
        let endpoint = state.self_endpoint.clone();
        state.members.insert(
            id,
            ClusterMember {
                id,
                endpoint,
                origin: MemberOrigin::Local,
            },
        );
        state.self_id = Some(id);

        tracing::info!(member_id = %id, "Assigned self member id");
        id
    }

    /// Restore a previously persisted self id.
    ///
    /// Returns the id already in effect if one was assigned earlier.
    pub fn adopt_self_id(&self, id: MemberId) -> Result<MemberId, EnsembleError> {
        let mut state = self.lock();
        if let Some(current) = state.self_id {
            return Ok(current);
        }
        if let Some(existing) = state.members.get(&id) {
            if existing.endpoint != state.self_endpoint {
                return Err(EnsembleError::Conflict {
                    id,
                    existing: existing.endpoint.clone(),
                    proposed: state.self_endpoint.clone(),
                });
            }
        }

        let endpoint = state.self_endpoint.clone();
        state.members.insert(
            id,
            ClusterMember {
                id,
                endpoint,
                origin: MemberOrigin::Local,
            },
        );
        state.self_id = Some(id);

        tracing::debug!(member_id = %id, "Adopted persisted self member id");
        Ok(id)
    }

    pub fn self_id(&self) -> Option<MemberId> {
        self.lock().self_id
    }

    pub fn self_endpoint(&self) -> Endpoint {
        self.lock().self_endpoint.clone()
    }

    /// Change this node's own endpoint (bind address or ports changed).
    pub fn set_self_endpoint(&self, endpoint: Endpoint) {
        let mut state = self.lock();
        if state.self_endpoint == endpoint {
            return;
        }
        state.self_endpoint = endpoint.clone();
        if let Some(id) = state.self_id {
            if let Some(member) = state.members.get_mut(&id) {
                member.endpoint = endpoint;
            }
        }
    }

    pub fn set_expected_size(&self, expected_size: usize) {
        self.lock().expected_size = expected_size.max(1);
    }

    /// Upsert a remote member.
    ///
    /// Re-announcing the same endpoint is a no-op. A different endpoint
    /// under an id already known fails with [`EnsembleError::Conflict`]
    /// and leaves the registry unchanged.
    pub fn record_peer(&self, id: MemberId, endpoint: Endpoint) -> Result<PeerUpdate, EnsembleError> {
        self.lock().upsert_remote(id, endpoint, false)
    }

    /// Upsert a remote member, replacing a differing endpoint.
    ///
    /// Never replaces this node's own entry.
    pub fn replace_peer(&self, id: MemberId, endpoint: Endpoint) -> Result<PeerUpdate, EnsembleError> {
        self.lock().upsert_remote(id, endpoint, true)
    }

    /// Remove a remote member. This node's own entry is never removed.
    pub fn remove_peer(&self, id: MemberId) -> Option<ClusterMember> {
        let mut state = self.lock();
        if state.self_id == Some(id) {
            return None;
        }
        state.members.remove(&id)
    }

    pub fn snapshot(&self) -> EnsembleSnapshot {
        let state = self.lock();
        EnsembleSnapshot {
            expected_size: state.expected_size,
            self_id: state.self_id,
            members: state.members.values().cloned().collect(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.lock().is_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> MemberId {
        MemberId::new(raw).unwrap()
    }

    fn ep(s: &str) -> Endpoint {
        s.parse().unwrap()
    }

    fn registry(expected: usize) -> Registry {
        Registry::new(expected, ep("host1:2888:3888"))
    }

    #[test]
    fn member_id_rejects_zero_and_garbage() {
        assert!(MemberId::new(0).is_none());
        assert!("0".parse::<MemberId>().is_err());
        assert!("-3".parse::<MemberId>().is_err());
        assert!("abc".parse::<MemberId>().is_err());
        assert_eq!("7".parse::<MemberId>().unwrap().get(), 7);
    }

    #[test]
    fn member_id_serde_rejects_zero() {
        assert!(serde_json::from_str::<MemberId>("0").is_err());
        let id: MemberId = serde_json::from_str("4").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "4");
    }

    #[test]
    fn endpoint_parse_and_display() {
        let e = ep("zk2.example.com:2888:3888");
        assert_eq!(e.host(), "zk2.example.com");
        assert_eq!(e.peer_port(), 2888);
        assert_eq!(e.leader_port(), 3888);
        assert_eq!(e.to_string(), "zk2.example.com:2888:3888");
    }

    #[test]
    fn endpoint_keeps_ipv6_host() {
        let e = ep("fd00::12:2888:3888");
        assert_eq!(e.host(), "fd00::12");
        assert_eq!(e.to_string(), "fd00::12:2888:3888");
    }

    #[test]
    fn endpoint_rejects_malformed() {
        for bad in ["", "host", "host:2888", ":2888:3888", "host:x:3888", "host:2888:0"] {
            assert!(bad.parse::<Endpoint>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn assign_self_id_is_idempotent() {
        let r = registry(3);
        let first = r.assign_self_id();
        let second = r.assign_self_id();
        assert_eq!(first, second);
        assert_eq!(first.get(), 1);
    }

    #[test]
    fn assign_picks_lowest_free_id() {
        let r = registry(3);
        r.record_peer(id(1), ep("a:2888:3888")).unwrap();
        r.record_peer(id(2), ep("b:2888:3888")).unwrap();
        r.record_peer(id(4), ep("d:2888:3888")).unwrap();
        assert_eq!(r.assign_self_id().get(), 3);
    }

    #[test]
    fn self_id_survives_unrelated_peer_updates() {
        let r = registry(3);
        let mine = r.assign_self_id();
        r.record_peer(id(5), ep("e:2888:3888")).unwrap();
        r.remove_peer(id(5));
        r.record_peer(id(2), ep("b:2888:3888")).unwrap();
        assert_eq!(r.assign_self_id(), mine);
        assert_eq!(r.self_id(), Some(mine));
    }

    #[test]
    fn record_peer_is_idempotent() {
        let r = registry(3);
        assert_eq!(r.record_peer(id(2), ep("b:2888:3888")).unwrap(), PeerUpdate::Added);
        let before = r.snapshot();
        assert_eq!(
            r.record_peer(id(2), ep("b:2888:3888")).unwrap(),
            PeerUpdate::Unchanged
        );
        assert_eq!(r.snapshot(), before);
    }

    #[test]
    fn conflicting_peer_leaves_state_unchanged() {
        let r = registry(3);
        r.record_peer(id(2), ep("b:2888:3888")).unwrap();
        let before = r.snapshot();

        let err = r.record_peer(id(2), ep("x:2888:3888")).unwrap_err();
        assert!(matches!(err, EnsembleError::Conflict { .. }));
        assert_eq!(r.snapshot(), before);
    }

    #[test]
    fn peer_cannot_claim_self_id() {
        let r = registry(3);
        let mine = r.assign_self_id();
        assert!(r.record_peer(mine, ep("other:2888:3888")).is_err());
        assert!(r.replace_peer(mine, ep("other:2888:3888")).is_err());
        assert_eq!(r.snapshot().member(mine).unwrap().origin, MemberOrigin::Local);
    }

    #[test]
    fn replace_peer_updates_endpoint() {
        let r = registry(3);
        r.record_peer(id(2), ep("b:2888:3888")).unwrap();
        let update = r.replace_peer(id(2), ep("b2:2888:3888")).unwrap();
        assert_eq!(
            update,
            PeerUpdate::Updated {
                previous: ep("b:2888:3888")
            }
        );
        assert_eq!(
            r.snapshot().member(id(2)).unwrap().endpoint,
            ep("b2:2888:3888")
        );
    }

    #[test]
    fn snapshot_is_sorted_by_member_id() {
        let r = registry(1);
        r.record_peer(id(10), ep("j:2888:3888")).unwrap();
        r.record_peer(id(3), ep("c:2888:3888")).unwrap();
        r.record_peer(id(2), ep("b:2888:3888")).unwrap();
        let ids: Vec<u32> = r.snapshot().members.iter().map(|m| m.id.get()).collect();
        assert_eq!(ids, vec![2, 3, 10]);
    }

    #[test]
    fn readiness_requires_size_and_self_id() {
        let r = registry(3);
        r.record_peer(id(2), ep("b:2888:3888")).unwrap();
        r.record_peer(id(3), ep("c:2888:3888")).unwrap();
        r.record_peer(id(4), ep("d:2888:3888")).unwrap();
        // Size threshold met, but self has no id yet.
        assert!(!r.is_ready());

        r.assign_self_id();
        assert!(r.is_ready());
        assert!(r.snapshot().is_ready());
    }

    #[test]
    fn readiness_drops_when_member_departs() {
        let r = registry(3);
        r.assign_self_id();
        r.record_peer(id(2), ep("b:2888:3888")).unwrap();
        assert!(!r.is_ready());
        r.record_peer(id(3), ep("c:2888:3888")).unwrap();
        assert!(r.is_ready());

        let removed = r.remove_peer(id(3)).unwrap();
        assert_eq!(removed.endpoint, ep("c:2888:3888"));
        assert!(!r.is_ready());
    }

    #[test]
    fn remove_never_drops_self() {
        let r = registry(1);
        let mine = r.assign_self_id();
        assert!(r.remove_peer(mine).is_none());
        assert!(r.is_ready());
    }

    #[test]
    fn adopt_restores_persisted_id() {
        let r = registry(1);
        assert_eq!(r.adopt_self_id(id(4)).unwrap(), id(4));
        assert_eq!(r.assign_self_id(), id(4));
        // A later adopt does not move the id.
        assert_eq!(r.adopt_self_id(id(9)).unwrap(), id(4));
    }

    #[test]
    fn adopt_conflicts_with_remote_holder() {
        let r = registry(1);
        r.record_peer(id(4), ep("other:2888:3888")).unwrap();
        assert!(matches!(
            r.adopt_self_id(id(4)),
            Err(EnsembleError::Conflict { .. })
        ));
        assert!(r.self_id().is_none());
    }

    #[test]
    fn self_endpoint_change_updates_member_entry() {
        let r = registry(1);
        let mine = r.assign_self_id();
        r.set_self_endpoint(ep("host1-new:2888:3888"));
        assert_eq!(
            r.snapshot().member(mine).unwrap().endpoint,
            ep("host1-new:2888:3888")
        );
    }

    #[test]
    fn concurrent_assignment_and_peer_updates_never_collide() {
        use std::sync::Arc;

        let r = Arc::new(registry(1));
        let peers = {
            let r = Arc::clone(&r);
            std::thread::spawn(move || {
                for raw in 2..50u32 {
                    let _ = r.record_peer(id(raw), ep(&format!("h{raw}:2888:3888")));
                }
            })
        };
        let mine = r.assign_self_id();
        peers.join().unwrap();

        let snapshot = r.snapshot();
        let local: Vec<_> = snapshot
            .members
            .iter()
            .filter(|m| m.origin == MemberOrigin::Local)
            .collect();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].id, mine);
    }
}
