//! Keeper Crypto: content fingerprints and generated secrets.
//!
//! Fingerprints gate every regeneration decision: key material, keystores
//! and rendered configuration are rebuilt only when their fingerprint moves.

pub mod pinning;
pub mod secret;
