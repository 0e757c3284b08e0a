//! Opt-in advisory lock around registry mutations
//!
//! Off by default: the shared port file is last-writer-wins unless the
//! registry is built with `lock: true`. The lock is advisory (`flock`), so
//! it only serializes processes that also ask for it.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{RegistryError, Result};

/// Exclusive lock held until dropped
pub struct RegistryLock {
    path: PathBuf,
    #[cfg(unix)]
    _guard: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl RegistryLock {
    /// Block until the lock file at `path` is exclusively ours
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| {
                RegistryError::Lock(format!("Failed to open {}: {}", path.display(), e))
            })?;

        debug!(path = %path.display(), "acquiring registry lock");

        #[cfg(unix)]
        {
            use nix::fcntl::{Flock, FlockArg};

            let guard = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
                RegistryError::Lock(format!("flock {} failed: {}", path.display(), errno))
            })?;

            Ok(RegistryLock {
                path: path.to_path_buf(),
                _guard: guard,
            })
        }

        #[cfg(not(unix))]
        {
            tracing::warn!(
                path = %path.display(),
                "advisory locking unsupported on this platform, continuing unlocked"
            );
            Ok(RegistryLock {
                path: path.to_path_buf(),
                _file: file,
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "released registry lock");
    }
}
