//! Keeper Common: shared plumbing for the keeper crates.
//!
//! Error codes, default filesystem locations, JSON persistence and
//! atomic file installation with ownership and permission bits.

pub mod error;
pub mod install;
pub mod paths;
pub mod persist;

pub use error::ErrorCode;
pub use install::FileOwnership;
