//! File store storage primitives
//!
//! This crate owns every interaction with the durable medium: where a stored file lives,
//! whether the volume has room for it, and how bytes are written to it.
//!
//! ## Storage Layout
//!
//! One flat directory per owner under a configured storage root. The file name alone
//! encodes the file's identity and extension, and there is no metadata sidecar:
//!
//! ```text
//! <storage_root>/
//! └── <owner_id>/
//!     ├── <file_id>.pdf
//!     └── <other_file_id>
//! ```
//!
//! ## Components
//!
//! - [`PathResolver`] derives paths, creates owner directories and locates stored files
//! - [`CapacityGuard`] refuses writes the volume has no room for
//! - [`ChunkWriter`] creates or appends to a stored file
//!
//! ## Example Usage
//!
//! ```no_run
//! use filestore_files::{ChunkWriter, PathResolver, StorageId};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = PathResolver::new("nfs/files");
//! let owner = StorageId::new("owner-1")?;
//! let file_id = StorageId::file_id("report")?;
//!
//! resolver.ensure_owner_dir(&owner).await?;
//! let path = resolver.upload_path(&owner, &file_id, "report.pdf");
//! ChunkWriter.create_and_write(&path, b"%PDF-").await?;
//! # Ok(())
//! # }
//! ```

mod capacity;
mod paths;
mod writer;

pub use capacity::{CapacityGuard, SpaceProbe, StatvfsProbe};
pub use filestore_types::{IdError, StorageId};
pub use paths::{extension_of, stored_name, PathResolver};
pub use writer::ChunkWriter;

use std::path::PathBuf;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// An owner or file identifier is not a safe path component
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdError),

    /// Owner directory could not be created
    #[error("failed to create owner directory (path: {path}): {source}", path = path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The volume does not have room for the expected number of bytes
    #[error(
        "insufficient free space (path: {path}): {required} bytes required, {available} available",
        path = path.display()
    )]
    ResourceExhausted {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    /// Free space on the volume could not be determined
    #[error("failed to check free space (path: {path}): {source}", path = path.display())]
    CapacityCheck {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Create or append to a stored file failed
    #[error("failed to write file (path: {path}): {source}", path = path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No stored file matches the requested owner and file identifier
    #[error("file not found: {0}")]
    NotFound(String),

    /// Reading a stored file or its owner directory failed
    #[error("failed to read file (path: {path}): {source}", path = path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type FilesResult<T> = std::result::Result<T, FilesError>;
