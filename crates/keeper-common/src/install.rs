//! Atomic file installation with ownership and permission bits.
//!
//! Files are written to a temp file in the destination directory, given
//! their final mode and owner, then renamed over the target. A reader
//! never observes a half-written keystore or properties file.

use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

const DEFAULT_MODE: u32 = 0o640;

/// Owner, group and mode applied to every installed file.
///
/// `None` leaves the owner/group of the writing process in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOwnership {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mode: u32,
}

impl Default for FileOwnership {
    fn default() -> Self {
        Self {
            uid: None,
            gid: None,
            mode: DEFAULT_MODE,
        }
    }
}

impl FileOwnership {
    pub fn with_mode(mode: u32) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Apply mode and owner to an existing path.
    pub fn apply(&self, path: &Path) -> Result<(), io::Error> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(self.mode))?;
            if self.uid.is_some() || self.gid.is_some() {
                std::os::unix::fs::chown(path, self.uid, self.gid)?;
            }
        }
        #[cfg(not(unix))]
        {
            let _ = path;
        }
        Ok(())
    }
}

/// Atomically install `contents` at `path` with the given ownership.
pub fn install_bytes(path: &Path, contents: &[u8], ownership: &FileOwnership) -> Result<(), io::Error> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;
    ownership.apply(staged.path())?;
    staged.persist(path).map_err(|e| e.error)?;

    tracing::debug!(path = %path.display(), mode = format_args!("{:o}", ownership.mode), "File installed");
    Ok(())
}
