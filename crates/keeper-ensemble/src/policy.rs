//! Security policy and the TLS mode it selects.

use serde::{Deserialize, Serialize};

use crate::material::MaterialScope;

/// Operator-supplied certificate and key for one scope, base64-encoded PEM.
///
/// Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalMaterial {
    pub certificate: Option<String>,
    pub private_key: Option<String>,
}

impl ExternalMaterial {
    pub fn new(certificate: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            certificate: Some(certificate.into()),
            private_key: Some(private_key.into()),
        }
    }
}

/// Which listeners run TLS and where their key material comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPolicy {
    pub client_tls_enabled: bool,
    pub quorum_tls_enabled: bool,
    pub generate_root_ca: bool,
    pub client_external: ExternalMaterial,
    pub quorum_external: ExternalMaterial,
}

impl SecurityPolicy {
    pub fn plaintext() -> Self {
        Self::default()
    }

    pub fn tls_enabled(&self, scope: MaterialScope) -> bool {
        match scope {
            MaterialScope::Quorum => self.quorum_tls_enabled,
            MaterialScope::Client => self.client_tls_enabled,
        }
    }

    pub fn external(&self, scope: MaterialScope) -> &ExternalMaterial {
        match scope {
            MaterialScope::Quorum => &self.quorum_external,
            MaterialScope::Client => &self.client_external,
        }
    }

    pub fn mode(&self) -> TlsMode {
        TlsMode::from(self)
    }
}

/// Effective listener mode.
///
/// | client | quorum | mode |
/// |---|---|---|
/// | off | off | `Plaintext` |
/// | on | off | `SecureClient` |
/// | any | on | `SecureQuorum { client_tls }` |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Plaintext,
    SecureClient,
    SecureQuorum { client_tls: bool },
}

impl TlsMode {
    pub fn client_tls(self) -> bool {
        matches!(
            self,
            Self::SecureClient | Self::SecureQuorum { client_tls: true }
        )
    }

    pub fn quorum_tls(self) -> bool {
        matches!(self, Self::SecureQuorum { .. })
    }
}

impl From<&SecurityPolicy> for TlsMode {
    fn from(policy: &SecurityPolicy) -> Self {
        match (policy.client_tls_enabled, policy.quorum_tls_enabled) {
            (false, false) => Self::Plaintext,
            (true, false) => Self::SecureClient,
            (client_tls, true) => Self::SecureQuorum { client_tls },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(client: bool, quorum: bool) -> SecurityPolicy {
        SecurityPolicy {
            client_tls_enabled: client,
            quorum_tls_enabled: quorum,
            ..SecurityPolicy::default()
        }
    }

    #[test]
    fn mode_table() {
        assert_eq!(policy(false, false).mode(), TlsMode::Plaintext);
        assert_eq!(policy(true, false).mode(), TlsMode::SecureClient);
        assert_eq!(
            policy(false, true).mode(),
            TlsMode::SecureQuorum { client_tls: false }
        );
        assert_eq!(
            policy(true, true).mode(),
            TlsMode::SecureQuorum { client_tls: true }
        );
    }

    #[test]
    fn mode_flags_follow_policy() {
        for (client, quorum) in [(false, false), (true, false), (false, true), (true, true)] {
            let mode = policy(client, quorum).mode();
            assert_eq!(mode.client_tls(), client);
            assert_eq!(mode.quorum_tls(), quorum);
        }
    }

    #[test]
    fn scope_accessors() {
        let mut p = policy(true, false);
        p.quorum_external = ExternalMaterial::new("Y2VydA==", "a2V5");
        assert!(p.tls_enabled(MaterialScope::Client));
        assert!(!p.tls_enabled(MaterialScope::Quorum));
        assert_eq!(
            p.external(MaterialScope::Quorum).certificate.as_deref(),
            Some("Y2VydA==")
        );
        assert_eq!(p.external(MaterialScope::Client), &ExternalMaterial::default());
    }
}
