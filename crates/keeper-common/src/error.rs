use serde::{Deserialize, Serialize};

/// Machine-readable error codes shared by every keeper crate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Conflict,
    IncompleteMaterial,
    KeystoreBuildFailed,
    InvalidEndpoint,
    InvalidMemberId,
    InvalidSettings,
    DecodeError,
    CertificateError,
    TransportError,
    IoError,
    Internal,
}

impl ErrorCode {
    /// Whether the condition clears itself on a later membership or
    /// configuration event.
    ///
    /// Transient failures are retried by the next reconcile cycle;
    /// the rest halt configuration emission until an operator acts.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Conflict | Self::KeystoreBuildFailed | Self::TransportError | Self::IoError => {
                true
            }
            Self::IncompleteMaterial
            | Self::InvalidEndpoint
            | Self::InvalidMemberId
            | Self::InvalidSettings
            | Self::DecodeError
            | Self::CertificateError
            | Self::Internal => false,
        }
    }

    /// Process exit code used by the CLI when a cycle ends on this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            _ if self.is_transient() => 75, // EX_TEMPFAIL
            Self::InvalidSettings => 78,    // EX_CONFIG
            _ => 1,
        }
    }
}
