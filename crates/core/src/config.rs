//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the transfer
//! services. Nothing in the request path reads environment variables or depends on the
//! process working directory beyond the storage root captured here.

use crate::constants::{DEFAULT_DOWNLOAD_WINDOW, DEFAULT_STORAGE_ROOT};
use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// When an upload session consults the capacity guard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CapacityPolicy {
    /// Once, before the first byte of the session is written.
    #[default]
    PerSession,
    /// Before the first write and again before every appended fragment.
    PerFragment,
}

impl FromStr for CapacityPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(Self::PerSession),
            "fragment" => Ok(Self::PerFragment),
            other => Err(CoreError::InvalidConfig(format!(
                "unknown capacity policy {other:?} (expected \"session\" or \"fragment\")"
            ))),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    storage_root: PathBuf,
    download_window: usize,
    capacity_policy: CapacityPolicy,
    session_locks: bool,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(
        storage_root: PathBuf,
        download_window: usize,
        capacity_policy: CapacityPolicy,
        session_locks: bool,
    ) -> CoreResult<Self> {
        if storage_root.as_os_str().is_empty() {
            return Err(CoreError::InvalidConfig(
                "storage root cannot be empty".into(),
            ));
        }
        if download_window == 0 {
            return Err(CoreError::InvalidConfig(
                "download window must be at least one byte".into(),
            ));
        }

        Ok(Self {
            storage_root,
            download_window,
            capacity_policy,
            session_locks,
        })
    }

    /// Configuration with default window, policy and locking for `storage_root`.
    pub fn with_storage_root(storage_root: impl Into<PathBuf>) -> CoreResult<Self> {
        Self::new(
            storage_root.into(),
            DEFAULT_DOWNLOAD_WINDOW,
            CapacityPolicy::default(),
            true,
        )
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn download_window(&self) -> usize {
        self.download_window
    }

    pub fn capacity_policy(&self) -> CapacityPolicy {
        self.capacity_policy
    }

    pub fn session_locks(&self) -> bool {
        self.session_locks
    }

    /// Create the storage root (and its parents) if missing.
    ///
    /// Owner directories are created lazily beneath it, but the root itself is only ever
    /// created here, at startup.
    pub fn prepare_storage_root(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.storage_root).map_err(CoreError::StorageRoot)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve the storage root from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_STORAGE_ROOT`].
pub fn storage_root_from_env_value(value: Option<String>) -> PathBuf {
    non_empty(value)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT))
}

/// Parse the download window size in bytes from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_DOWNLOAD_WINDOW`].
pub fn download_window_from_env_value(value: Option<String>) -> CoreResult<usize> {
    match non_empty(value) {
        None => Ok(DEFAULT_DOWNLOAD_WINDOW),
        Some(v) => match v.parse::<usize>() {
            Ok(0) | Err(_) => Err(CoreError::InvalidConfig(format!(
                "download window must be a positive integer, got {v:?}"
            ))),
            Ok(n) => Ok(n),
        },
    }
}

/// Parse the capacity policy from an optional string value.
pub fn capacity_policy_from_env_value(value: Option<String>) -> CoreResult<CapacityPolicy> {
    non_empty(value)
        .map(|v| v.parse::<CapacityPolicy>())
        .transpose()
        .map(Option::unwrap_or_default)
}

/// Parse a `true`/`false` flag, falling back to `default` when unset.
pub fn flag_from_env_value(value: Option<String>, default: bool) -> CoreResult<bool> {
    match non_empty(value).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(CoreError::InvalidConfig(format!(
            "expected true or false, got {v:?}"
        ))),
    }
}
