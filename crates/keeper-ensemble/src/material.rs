//! Key material: CA certificate and private key pairs per TLS scope.
//!
//! Material is either generated here as a self-signed root CA (rcgen) or
//! supplied by the operator as base64-encoded PEM. The provider keeps the
//! generated material for the lifetime of the node state and compares
//! content fingerprints to detect operator replacements.

use std::fmt;

use base64::Engine;
use keeper_crypto::pinning;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::EnsembleError;
use crate::policy::{ExternalMaterial, SecurityPolicy};

/// Root CA validity period.
const CA_VALIDITY_DAYS: i64 = 10 * 365;

const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// The two independent TLS scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialScope {
    /// Peer-to-peer traffic inside the ensemble.
    Quorum,
    /// The client-facing listener.
    Client,
}

impl MaterialScope {
    pub const ALL: [MaterialScope; 2] = [MaterialScope::Quorum, MaterialScope::Client];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quorum => "quorum",
            Self::Client => "client",
        }
    }

    /// Distinguished name used when generating this scope's root CA.
    pub fn common_name(self, service: &str) -> String {
        match self {
            Self::Quorum => format!("quorum-{service}-root-ca"),
            Self::Client => format!("ssl-{service}-root-ca"),
        }
    }
}

impl fmt::Display for MaterialScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialSource {
    GeneratedSelfSigned,
    ExternallySupplied,
}

/// A certificate chain plus private key, both PEM.
///
/// Cannot be constructed half-populated. The private key is zeroized on
/// drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MaterialRecord", into = "MaterialRecord")]
pub struct KeyMaterial {
    certificate_pem: String,
    private_key_pem: String,
    source: MaterialSource,
}

impl KeyMaterial {
    /// Build material from its two parts.
    ///
    /// Both empty means "no material" (`Ok(None)`); exactly one empty
    /// fails with [`EnsembleError::IncompleteMaterial`].
    pub fn from_parts(
        scope: MaterialScope,
        certificate_pem: impl Into<String>,
        private_key_pem: impl Into<String>,
        source: MaterialSource,
    ) -> Result<Option<Self>, EnsembleError> {
        let certificate_pem = certificate_pem.into();
        let mut private_key_pem = private_key_pem.into();

        let has_cert = !certificate_pem.trim().is_empty();
        let has_key = !private_key_pem.trim().is_empty();

        match (has_cert, has_key) {
            (true, true) => Ok(Some(Self {
                certificate_pem,
                private_key_pem,
                source,
            })),
            (false, false) => Ok(None),
            (true, false) => Err(EnsembleError::IncompleteMaterial {
                scope,
                missing: "private key",
            }),
            (false, true) => {
                private_key_pem.zeroize();
                Err(EnsembleError::IncompleteMaterial {
                    scope,
                    missing: "certificate",
                })
            }
        }
    }

    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    pub fn source(&self) -> MaterialSource {
        self.source
    }

    /// Content fingerprint over certificate and key.
    pub fn fingerprint(&self) -> String {
        pinning::fingerprint_fields([
            self.certificate_pem.as_bytes(),
            self.private_key_pem.as_bytes(),
        ])
    }

    /// Certificates a peer or client should trust for this material.
    pub fn trust_anchors(&self) -> Result<Vec<String>, EnsembleError> {
        trust_anchors_of(&self.certificate_pem)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("source", &self.source)
            .field("fingerprint", &self.fingerprint())
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.private_key_pem.zeroize();
    }
}

/// Serialized form, validated on the way back in.
#[derive(Serialize, Deserialize)]
struct MaterialRecord {
    certificate_pem: String,
    private_key_pem: String,
    source: MaterialSource,
}

impl TryFrom<MaterialRecord> for KeyMaterial {
    type Error = String;

    fn try_from(mut record: MaterialRecord) -> Result<Self, Self::Error> {
        if record.certificate_pem.trim().is_empty() || record.private_key_pem.trim().is_empty() {
            record.private_key_pem.zeroize();
            return Err("stored key material is incomplete".to_string());
        }
        Ok(Self {
            certificate_pem: std::mem::take(&mut record.certificate_pem),
            private_key_pem: std::mem::take(&mut record.private_key_pem),
            source: record.source,
        })
    }
}

impl From<KeyMaterial> for MaterialRecord {
    fn from(mut material: KeyMaterial) -> Self {
        Self {
            certificate_pem: std::mem::take(&mut material.certificate_pem),
            private_key_pem: std::mem::take(&mut material.private_key_pem),
            source: material.source,
        }
    }
}

/// Split a PEM chain into the certificates to trust.
///
/// A chain of several certificates contributes everything after the leaf;
/// a single certificate contributes itself.
pub fn trust_anchors_of(chain_pem: &str) -> Result<Vec<String>, EnsembleError> {
    let blocks = pem::parse_many(chain_pem.as_bytes())
        .map_err(|e| EnsembleError::Certificate(format!("unparsable certificate chain: {e}")))?;
    let chain: Vec<_> = blocks
        .into_iter()
        .filter(|p| p.tag() == CERTIFICATE_TAG)
        .collect();

    let anchors = match chain.len() {
        0 => {
            return Err(EnsembleError::Certificate(
                "no CERTIFICATE block in chain".to_string(),
            ))
        }
        1 => &chain[..],
        _ => &chain[1..],
    };
    Ok(anchors.iter().map(pem::encode).collect())
}

/// Produces a self-signed CA for a common name.
pub trait CertificateGenerator: Send + Sync {
    /// Returns `(certificate_pem, private_key_pem)`.
    fn generate(&self, common_name: &str) -> Result<(String, String), EnsembleError>;
}

/// ECDSA P-256 self-signed root CA via rcgen.
#[derive(Debug, Clone, Copy)]
pub struct RcgenGenerator {
    validity_days: i64,
}

impl Default for RcgenGenerator {
    fn default() -> Self {
        Self {
            validity_days: CA_VALIDITY_DAYS,
        }
    }
}

impl RcgenGenerator {
    pub fn with_validity_days(validity_days: i64) -> Self {
        Self { validity_days }
    }

    fn build_params(&self, common_name: &str) -> CertificateParams {
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::hours(1);
        params.not_after = now + time::Duration::days(self.validity_days);
        params
    }
}

impl CertificateGenerator for RcgenGenerator {
    fn generate(&self, common_name: &str) -> Result<(String, String), EnsembleError> {
        let key = KeyPair::generate().map_err(|e| EnsembleError::Certificate(e.to_string()))?;
        let cert = self
            .build_params(common_name)
            .self_signed(&key)
            .map_err(|e| EnsembleError::Certificate(e.to_string()))?;

        tracing::debug!(common_name, "Self-signed CA generated");
        Ok((cert.pem(), key.serialize_pem()))
    }
}

/// Generated and currently effective material of one scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeSlots {
    /// Material generated here, kept so regeneration never happens twice.
    pub generated: Option<KeyMaterial>,
    /// Material last handed out for this scope.
    pub current: Option<KeyMaterial>,
}

/// Persistable material of both scopes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialStore {
    pub quorum: ScopeSlots,
    pub client: ScopeSlots,
}

impl MaterialStore {
    pub fn slots(&self, scope: MaterialScope) -> &ScopeSlots {
        match scope {
            MaterialScope::Quorum => &self.quorum,
            MaterialScope::Client => &self.client,
        }
    }

    fn slots_mut(&mut self, scope: MaterialScope) -> &mut ScopeSlots {
        match scope {
            MaterialScope::Quorum => &mut self.quorum,
            MaterialScope::Client => &mut self.client,
        }
    }

    pub fn current(&self, scope: MaterialScope) -> Option<&KeyMaterial> {
        self.slots(scope).current.as_ref()
    }
}

/// How the effective material of a scope moved during a resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialChange {
    Unchanged,
    Generated,
    Replaced,
    Cleared,
}

impl MaterialChange {
    pub fn is_change(self) -> bool {
        self != Self::Unchanged
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub material: Option<KeyMaterial>,
    pub change: MaterialChange,
}

/// Obtains key material for each scope according to the policy.
pub struct MaterialProvider {
    generator: Box<dyn CertificateGenerator>,
    service_name: String,
    store: MaterialStore,
}

impl MaterialProvider {
    pub fn new(generator: Box<dyn CertificateGenerator>, service_name: impl Into<String>) -> Self {
        Self {
            generator,
            service_name: service_name.into(),
            store: MaterialStore::default(),
        }
    }

    pub fn with_store(mut self, store: MaterialStore) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &MaterialStore {
        &self.store
    }

    pub fn current(&self, scope: MaterialScope) -> Option<&KeyMaterial> {
        self.store.current(scope)
    }

    pub fn obtain_quorum_material(
        &mut self,
        policy: &SecurityPolicy,
    ) -> Result<Option<KeyMaterial>, EnsembleError> {
        self.resolve(MaterialScope::Quorum, policy).map(|r| r.material)
    }

    pub fn obtain_client_material(
        &mut self,
        policy: &SecurityPolicy,
    ) -> Result<Option<KeyMaterial>, EnsembleError> {
        self.resolve(MaterialScope::Client, policy).map(|r| r.material)
    }

    /// Work out the effective material of `scope` and record it as current.
    ///
    /// With `generate_root_ca` the scope's generated CA is reused, or
    /// created on first use. Otherwise the operator's base64 material is
    /// decoded. On error the store is left as it was.
    pub fn resolve(
        &mut self,
        scope: MaterialScope,
        policy: &SecurityPolicy,
    ) -> Result<Resolution, EnsembleError> {
        let mut generated = false;
        let desired = if policy.generate_root_ca {
            match &self.store.slots(scope).generated {
                Some(existing) => Some(existing.clone()),
                None => {
                    let material = self.generate(scope)?;
                    self.store.slots_mut(scope).generated = Some(material.clone());
                    generated = true;
                    Some(material)
                }
            }
        } else {
            decode_external(scope, policy.external(scope))?
        };

        let slots = self.store.slots_mut(scope);
        let change = match (&slots.current, &desired) {
            (None, None) => MaterialChange::Unchanged,
            (Some(_), None) => MaterialChange::Cleared,
            (Some(current), Some(next))
                if pinning::fingerprints_match(&current.fingerprint(), &next.fingerprint()) =>
            {
                MaterialChange::Unchanged
            }
            (_, Some(_)) if generated => MaterialChange::Generated,
            (_, Some(_)) => MaterialChange::Replaced,
        };

        match change {
            MaterialChange::Unchanged => {}
            MaterialChange::Cleared => {
                tracing::info!(scope = %scope, "Key material withdrawn");
            }
            MaterialChange::Generated | MaterialChange::Replaced => {
                if let Some(next) = &desired {
                    tracing::info!(
                        scope = %scope,
                        source = ?next.source(),
                        fingerprint = %next.fingerprint(),
                        "Key material changed"
                    );
                }
            }
        }

        slots.current = desired.clone();
        Ok(Resolution {
            material: desired,
            change,
        })
    }

    fn generate(&self, scope: MaterialScope) -> Result<KeyMaterial, EnsembleError> {
        let common_name = scope.common_name(&self.service_name);
        let (cert, key) = self.generator.generate(&common_name)?;
        let material = KeyMaterial::from_parts(scope, cert, key, MaterialSource::GeneratedSelfSigned)?
            .ok_or_else(|| {
                EnsembleError::Certificate(format!("generator returned no material for {common_name}"))
            })?;

        tracing::info!(scope = %scope, common_name = %common_name, "Generated self-signed root CA");
        Ok(material)
    }
}

fn decode_external(
    scope: MaterialScope,
    external: &ExternalMaterial,
) -> Result<Option<KeyMaterial>, EnsembleError> {
    let certificate = decode_field(scope, "certificate", external.certificate.as_deref())?;
    let private_key = decode_field(scope, "private key", external.private_key.as_deref())?;

    let material = KeyMaterial::from_parts(
        scope,
        certificate.unwrap_or_default(),
        private_key.unwrap_or_default(),
        MaterialSource::ExternallySupplied,
    )?;
    if let Some(material) = &material {
        material.trust_anchors()?;
    }
    Ok(material)
}

fn decode_field(
    scope: MaterialScope,
    what: &str,
    value: Option<&str>,
) -> Result<Option<String>, EnsembleError> {
    let compact: String = match value {
        Some(raw) => raw.split_whitespace().collect(),
        None => return Ok(None),
    };
    if compact.is_empty() {
        return Ok(None);
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| EnsembleError::Decode(format!("{scope} {what}: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| EnsembleError::Decode(format!("{scope} {what}: not UTF-8 text")))?;
    Ok(Some(text))
}
