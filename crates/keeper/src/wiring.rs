//! Production collaborators for a node.

use keeper_ensemble::keystore::OpensslPackager;
use keeper_ensemble::material::RcgenGenerator;
use keeper_ensemble::render::PropertiesFileSink;
use keeper_ensemble::service::SystemdControl;
use keeper_ensemble::transport::FileTransport;
use keeper_ensemble::{Collaborators, EnsembleError, EnsembleNode, RelationTransport};

use crate::config::KeeperConfig;

pub fn collaborators(config: &KeeperConfig) -> Collaborators {
    let node = &config.node;
    let unit = node.unit_name.clone();

    let clients = config.relation.clients_dir.as_ref().map(|dir| {
        Box::new(FileTransport::new(dir, unit.clone())) as Box<dyn RelationTransport>
    });

    Collaborators {
        peers: Box::new(FileTransport::new(&config.relation.peers_dir, unit)),
        clients,
        sink: Box::new(
            PropertiesFileSink::new(&node.paths.config_file, &node.paths.log4j_file)
                .with_ownership(node.ownership),
        ),
        service: Box::new(SystemdControl::new(node.systemd_unit.clone())),
        generator: Box::new(RcgenGenerator::default()),
        packager: Box::new(OpensslPackager),
    }
}

pub fn open_node(config: &KeeperConfig) -> Result<EnsembleNode, EnsembleError> {
    tracing::debug!(
        unit = %config.node.unit_name,
        peers = %config.relation.peers_dir.display(),
        "Opening node"
    );
    EnsembleNode::open(config.node.clone(), collaborators(config))
}
