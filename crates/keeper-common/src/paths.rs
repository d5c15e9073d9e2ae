use std::path::PathBuf;

/// Root state directory for keeper.
///
/// Holds the persisted node state and the audit log. Overridable with
/// `KEEPER_STATE_DIR` so tests and side-by-side installs stay isolated.
pub fn keeper_state_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("KEEPER_STATE_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from("/var/lib/keeper")
}

/// Directory holding keystores and truststores.
pub fn ssl_private_dir() -> PathBuf {
    PathBuf::from("/var/ssl/private")
}

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/keeper/keeper.toml")
}
