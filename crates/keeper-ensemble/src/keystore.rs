//! Keystore and truststore synthesis.
//!
//! A store is rebuilt only when the fingerprint of its source material
//! changes. Packaging happens in a private staging directory that is
//! removed on every exit path; the result is installed atomically so the
//! previous store stays in place if anything fails.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use keeper_common::install::{install_bytes, FileOwnership};
use keeper_crypto::{pinning, secret};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::EnsembleError;
use crate::material::{KeyMaterial, MaterialScope};

const STAGING_PREFIX: &str = "keeper-ks-";

/// Environment variable carrying store passwords to openssl and keytool.
const PASSWORD_ENV: &str = "KEEPER_STORE_PASS";

/// Alias of the private key entry inside a keystore.
const KEY_ALIAS: &str = "localhost";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Keystore,
    Truststore,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keystore => f.write_str("keystore"),
            Self::Truststore => f.write_str("truststore"),
        }
    }
}

/// Descriptor of an installed store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keystore {
    pub scope: MaterialScope,
    pub kind: StoreKind,
    pub path: PathBuf,
    password: String,
    /// Fingerprint of the material the store was built from.
    pub derived_from: String,
}

impl Keystore {
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Keystore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keystore")
            .field("scope", &self.scope)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("password", &"<redacted>")
            .field("derived_from", &self.derived_from)
            .finish()
    }
}

impl Drop for Keystore {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("{tool} is not available: {source}")]
    ToolUnavailable {
        tool: &'static str,
        source: io::Error,
    },

    #[error("{tool} exit code {code}: {stderr}")]
    CommandFailed {
        tool: &'static str,
        code: i32,
        stderr: String,
    },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Turns PEM material into password-protected store bytes.
///
/// `staging` is an empty private directory owned by the caller; any
/// intermediate files belong there and are removed with it.
pub trait StorePackager: Send + Sync {
    fn package_keystore(
        &self,
        staging: &Path,
        certificate_pem: &str,
        private_key_pem: &str,
        password: &str,
    ) -> Result<Vec<u8>, PackagingError>;

    fn package_truststore(
        &self,
        staging: &Path,
        anchors: &[String],
        password: &str,
    ) -> Result<Vec<u8>, PackagingError>;
}

/// PKCS#12 stores built with `openssl` and `keytool`.
#[derive(Debug, Clone, Default)]
pub struct OpensslPackager;

impl OpensslPackager {
    fn run(tool: &'static str, command: &mut Command) -> Result<(), PackagingError> {
        let output = command
            .output()
            .map_err(|source| PackagingError::ToolUnavailable { tool, source })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::warn!(tool, stderr = %stderr.trim(), "Store packaging command failed");
        Err(PackagingError::CommandFailed {
            tool,
            code: output.status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        })
    }

    fn write_private(path: &Path, contents: &str) -> Result<(), PackagingError> {
        std::fs::write(path, contents)?;
        FileOwnership::with_mode(0o600).apply(path)?;
        Ok(())
    }
}

impl StorePackager for OpensslPackager {
    fn package_keystore(
        &self,
        staging: &Path,
        certificate_pem: &str,
        private_key_pem: &str,
        password: &str,
    ) -> Result<Vec<u8>, PackagingError> {
        let cert_path = staging.join("server.pem");
        let key_path = staging.join("server.key");
        let out_path = staging.join("keystore.p12");

        Self::write_private(&cert_path, certificate_pem)?;
        Self::write_private(&key_path, private_key_pem)?;

        Self::run(
            "openssl",
            Command::new("openssl")
                .args(["pkcs12", "-export", "-name", KEY_ALIAS])
                .arg("-in")
                .arg(&cert_path)
                .arg("-inkey")
                .arg(&key_path)
                .arg("-out")
                .arg(&out_path)
                .arg("-passout")
                .arg(format!("env:{PASSWORD_ENV}"))
                .env(PASSWORD_ENV, password),
        )?;

        Ok(std::fs::read(&out_path)?)
    }

    fn package_truststore(
        &self,
        staging: &Path,
        anchors: &[String],
        password: &str,
    ) -> Result<Vec<u8>, PackagingError> {
        if anchors.is_empty() {
            return Err(PackagingError::MalformedInput(
                "no certificates to trust".to_string(),
            ));
        }
        let out_path = staging.join("truststore.p12");

        for (i, anchor) in anchors.iter().enumerate() {
            let anchor_path = staging.join(format!("anchor-{i}.pem"));
            Self::write_private(&anchor_path, anchor)?;

            Self::run(
                "keytool",
                Command::new("keytool")
                    .args(["-importcert", "-noprompt", "-storetype", "pkcs12"])
                    .arg("-alias")
                    .arg(format!("host.{i}"))
                    .arg("-file")
                    .arg(&anchor_path)
                    .arg("-keystore")
                    .arg(&out_path)
                    .args(["-storepass:env", PASSWORD_ENV])
                    .env(PASSWORD_ENV, password),
            )?;
        }

        Ok(std::fs::read(&out_path)?)
    }
}

/// Builds and remembers the stores of both scopes.
pub struct KeystoreSynthesizer {
    packager: Box<dyn StorePackager>,
    staging_dir: PathBuf,
    ownership: FileOwnership,
    records: BTreeMap<(MaterialScope, StoreKind), Keystore>,
    rotations: Vec<Keystore>,
}

impl KeystoreSynthesizer {
    pub fn new(packager: Box<dyn StorePackager>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            packager,
            staging_dir: staging_dir.into(),
            ownership: FileOwnership::default(),
            records: BTreeMap::new(),
            rotations: Vec::new(),
        }
    }

    /// Restore descriptors persisted by an earlier run.
    pub fn with_records(mut self, records: impl IntoIterator<Item = Keystore>) -> Self {
        self.records = records
            .into_iter()
            .map(|ks| ((ks.scope, ks.kind), ks))
            .collect();
        self
    }

    pub fn set_ownership(&mut self, ownership: FileOwnership) {
        self.ownership = ownership;
    }

    pub fn set_staging_dir(&mut self, staging_dir: impl Into<PathBuf>) {
        self.staging_dir = staging_dir.into();
    }

    pub fn records(&self) -> Vec<Keystore> {
        self.records.values().cloned().collect()
    }

    pub fn current(&self, scope: MaterialScope, kind: StoreKind) -> Option<&Keystore> {
        self.records.get(&(scope, kind))
    }

    /// Stores rebuilt since the last call.
    pub fn take_rotations(&mut self) -> Vec<Keystore> {
        std::mem::take(&mut self.rotations)
    }

    /// Fingerprint over every known store, for change detection.
    pub fn digest(&self) -> String {
        pinning::fingerprint_fields(self.records.values().flat_map(|ks| {
            [
                ks.scope.as_str().to_string(),
                ks.kind.to_string(),
                ks.path.display().to_string(),
                ks.derived_from.clone(),
            ]
        }))
    }

    /// Make sure the keystore at `path` holds `material`.
    ///
    /// Unchanged material with the store still on disk is a no-op that
    /// returns the cached descriptor. Changed material gets a fresh
    /// password. If the file vanished the store is rebuilt with the
    /// password it already had.
    pub fn ensure_keystore(
        &mut self,
        material: &KeyMaterial,
        scope: MaterialScope,
        path: &Path,
    ) -> Result<Keystore, EnsembleError> {
        let fingerprint = material.fingerprint();
        let slot = (scope, StoreKind::Keystore);

        let password = match self.records.get(&slot) {
            Some(existing) if pinning::fingerprints_match(&existing.derived_from, &fingerprint) => {
                if existing.path == path && path.exists() {
                    return Ok(existing.clone());
                }
                existing.password.clone()
            }
            _ => new_password(),
        };

        let bytes = self.stage(scope, |packager, staging| {
            packager.package_keystore(
                staging,
                material.certificate_pem(),
                material.private_key_pem(),
                &password,
            )
        })?;

        self.commit(scope, StoreKind::Keystore, path, password, fingerprint, &bytes)
    }

    /// Make sure the truststore at `path` trusts exactly `anchors`.
    ///
    /// Anchor order and duplicates do not matter. The password is created
    /// once per scope and kept across rebuilds.
    pub fn ensure_truststore(
        &mut self,
        scope: MaterialScope,
        anchors: &[String],
        path: &Path,
    ) -> Result<Keystore, EnsembleError> {
        let mut anchors: Vec<String> = anchors.iter().map(|a| a.trim().to_string()).collect();
        anchors.sort();
        anchors.dedup();
        if anchors.is_empty() {
            return Err(EnsembleError::KeystoreBuild {
                scope,
                reason: "truststore has no certificates to trust".to_string(),
            });
        }

        let fingerprint = pinning::fingerprint_fields(&anchors);
        let slot = (scope, StoreKind::Truststore);

        let password = match self.records.get(&slot) {
            Some(existing) => {
                if pinning::fingerprints_match(&existing.derived_from, &fingerprint)
                    && existing.path == path
                    && path.exists()
                {
                    return Ok(existing.clone());
                }
                existing.password.clone()
            }
            None => new_password(),
        };

        let bytes = self.stage(scope, |packager, staging| {
            packager.package_truststore(staging, &anchors, &password)
        })?;

        self.commit(scope, StoreKind::Truststore, path, password, fingerprint, &bytes)
    }

    /// Run `build` inside a fresh staging directory and remove it afterwards.
    fn stage<F>(&self, scope: MaterialScope, build: F) -> Result<Vec<u8>, EnsembleError>
    where
        F: FnOnce(&dyn StorePackager, &Path) -> Result<Vec<u8>, PackagingError>,
    {
        std::fs::create_dir_all(&self.staging_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.staging_dir)?;

        let result = build(self.packager.as_ref(), staging.path());

        let staging_path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            tracing::warn!(path = %staging_path.display(), error = %e, "Failed to remove staging directory");
        }

        result.map_err(|e| {
            tracing::warn!(scope = %scope, error = %e, "Store packaging failed, keeping previous store");
            EnsembleError::KeystoreBuild {
                scope,
                reason: e.to_string(),
            }
        })
    }

    fn commit(
        &mut self,
        scope: MaterialScope,
        kind: StoreKind,
        path: &Path,
        password: String,
        fingerprint: String,
        bytes: &[u8],
    ) -> Result<Keystore, EnsembleError> {
        install_bytes(path, bytes, &self.ownership).map_err(|e| {
            tracing::warn!(scope = %scope, path = %path.display(), error = %e, "Store install failed");
            EnsembleError::KeystoreBuild {
                scope,
                reason: format!("install {}: {e}", path.display()),
            }
        })?;

        let store = Keystore {
            scope,
            kind,
            path: path.to_path_buf(),
            password,
            derived_from: fingerprint,
        };
        tracing::info!(
            scope = %scope,
            kind = %kind,
            path = %path.display(),
            "Store rebuilt"
        );

        self.records.insert((scope, kind), store.clone());
        self.rotations.push(store.clone());
        Ok(store)
    }
}

fn new_password() -> String {
    secret::generate_store_password().as_str().to_owned()
}
