//! Ensemble domain error types.

use keeper_common::error::ErrorCode;

use crate::material::MaterialScope;
use crate::registry::{Endpoint, MemberId};

#[derive(Debug, thiserror::Error)]
pub enum EnsembleError {
    #[error("member id {id} claimed by {existing} and {proposed}; retry membership negotiation")]
    Conflict {
        id: MemberId,
        existing: Endpoint,
        proposed: Endpoint,
    },

    #[error("{scope} key material is incomplete: {missing} is missing")]
    IncompleteMaterial {
        scope: MaterialScope,
        missing: &'static str,
    },

    #[error("{scope} keystore build failed: {reason}")]
    KeystoreBuild { scope: MaterialScope, reason: String },

    #[error("invalid endpoint {0:?}: expected host:peerPort:leaderPort")]
    InvalidEndpoint(String),

    #[error("invalid member id {0:?}: expected a positive integer")]
    InvalidMemberId(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnsembleError {
    /// Whether the next event should simply retry.
    pub fn is_transient(&self) -> bool {
        ErrorCode::from(self).is_transient()
    }
}

impl From<&EnsembleError> for ErrorCode {
    fn from(e: &EnsembleError) -> Self {
        match e {
            EnsembleError::Conflict { .. } => ErrorCode::Conflict,
            EnsembleError::IncompleteMaterial { .. } => ErrorCode::IncompleteMaterial,
            EnsembleError::KeystoreBuild { .. } => ErrorCode::KeystoreBuildFailed,
            EnsembleError::InvalidEndpoint(_) => ErrorCode::InvalidEndpoint,
            EnsembleError::InvalidMemberId(_) => ErrorCode::InvalidMemberId,
            EnsembleError::InvalidSettings(_) => ErrorCode::InvalidSettings,
            EnsembleError::Decode(_) => ErrorCode::DecodeError,
            EnsembleError::Certificate(_) => ErrorCode::CertificateError,
            EnsembleError::Transport(_) => ErrorCode::TransportError,
            EnsembleError::Io(_) => ErrorCode::IoError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_transient_incomplete_is_not() {
        let conflict = EnsembleError::Conflict {
            id: MemberId::new(2).unwrap(),
            existing: "a:2888:3888".parse().unwrap(),
            proposed: "b:2888:3888".parse().unwrap(),
        };
        assert!(conflict.is_transient());
        assert_eq!(ErrorCode::from(&conflict), ErrorCode::Conflict);
        assert!(conflict.to_string().contains("retry membership negotiation"));

        let incomplete = EnsembleError::IncompleteMaterial {
            scope: MaterialScope::Quorum,
            missing: "private key",
        };
        assert!(!incomplete.is_transient());
        assert_eq!(
            incomplete.to_string(),
            "quorum key material is incomplete: private key is missing"
        );
    }
}
