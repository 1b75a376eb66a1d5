//! Free-space checks ahead of destructive writes
//!
//! The guard only predicts: it does not reserve space, so a concurrent writer can still
//! fill the volume after a check has passed.

use crate::{FilesError, FilesResult};
use std::fmt::Debug;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Reports how many bytes are available to unprivileged writers on the volume holding a
/// directory.
pub trait SpaceProbe: Debug + Send + Sync {
    fn available_bytes(&self, dir: &Path) -> io::Result<u64>;
}

/// [`SpaceProbe`] backed by `statvfs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatvfsProbe;

impl SpaceProbe for StatvfsProbe {
    #[cfg(unix)]
    #[allow(clippy::unnecessary_cast)]
    fn available_bytes(&self, dir: &Path) -> io::Result<u64> {
        use std::ffi::CString;
        use std::mem::MaybeUninit;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(dir.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut stat = MaybeUninit::<libc::statvfs>::uninit();

        // SAFETY: `c_path` is NUL-terminated and `stat` points to writable storage of the
        // size statvfs expects.
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: statvfs returned 0, so it filled in the struct.
        let stat = unsafe { stat.assume_init() };

        Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
    }

    // No portable free-space query outside unix; never refuse.
    #[cfg(not(unix))]
    fn available_bytes(&self, _dir: &Path) -> io::Result<u64> {
        Ok(u64::MAX)
    }
}

/// Fails fast when a volume cannot hold an expected number of bytes.
#[derive(Debug, Clone)]
pub struct CapacityGuard {
    probe: Arc<dyn SpaceProbe>,
}

impl CapacityGuard {
    pub fn new(probe: Arc<dyn SpaceProbe>) -> Self {
        Self { probe }
    }

    /// Guard backed by [`StatvfsProbe`].
    pub fn statvfs() -> Self {
        Self::new(Arc::new(StatvfsProbe))
    }

    /// Checks that the volume holding `dir` has at least `required` free bytes.
    ///
    /// Returns the number of available bytes reported by the probe.
    ///
    /// # Errors
    ///
    /// - [`FilesError::ResourceExhausted`] if fewer than `required` bytes are available
    /// - [`FilesError::CapacityCheck`] if the probe fails
    pub fn ensure(&self, dir: &Path, required: u64) -> FilesResult<u64> {
        let available =
            self.probe
                .available_bytes(dir)
                .map_err(|source| FilesError::CapacityCheck {
                    path: dir.to_path_buf(),
                    source,
                })?;

        if available < required {
            return Err(FilesError::ResourceExhausted {
                path: dir.to_path_buf(),
                required,
                available,
            });
        }
        Ok(available)
    }
}

impl Default for CapacityGuard {
    fn default() -> Self {
        Self::statvfs()
    }
}
