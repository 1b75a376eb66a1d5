//! Constants used throughout the file store core crate.

/// Default storage root when no explicit directory is configured.
pub const DEFAULT_STORAGE_ROOT: &str = "./nfs/files";

/// Default maximum payload size of a single download fragment (1 MiB).
pub const DEFAULT_DOWNLOAD_WINDOW: usize = 1024 * 1024;
