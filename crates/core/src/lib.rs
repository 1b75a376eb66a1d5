//! # File Store Core
//!
//! Transfer protocol state machines for the file store.
//!
//! This crate turns inbound fragment streams into stored files and stored files back into
//! outbound fragment streams:
//! - [`UploadAssembler`] drives one upload session per inbound stream
//! - [`DownloadSegmenter`] re-segments a stored file into bounded windows
//! - [`SessionLocks`] serializes uploads addressing the same stored file
//!
//! Path layout, capacity checks and raw writes live in `filestore_files`.
//!
//! **No API concerns**: gRPC servers and protobuf types belong in `api-grpc` and `api-shared`.

pub mod config;
pub mod constants;
pub mod download;
pub mod error;
pub mod locks;
pub mod transfer;
pub mod upload;

pub use config::{CapacityPolicy, CoreConfig};
pub use download::{DownloadSegmenter, DownloadStream};
pub use error::{CoreError, CoreResult};
pub use filestore_files::{CapacityGuard, FilesError, IdError, SpaceProbe};
pub use locks::SessionLocks;
pub use transfer::{DownloadFragment, DownloadRequest, TransferFragment, TransferResult};
pub use upload::{UploadAssembler, UploadPhase, UploadSession};

use filestore_files::PathResolver;
use futures::Stream;
use std::fmt::Display;

/// Upload and download entry points sharing one storage root.
#[derive(Clone, Debug)]
pub struct FileTransferService {
    uploads: UploadAssembler,
    downloads: DownloadSegmenter,
}

impl FileTransferService {
    /// Creates a service whose capacity guard queries the real volume.
    pub fn new(config: &CoreConfig) -> Self {
        Self::with_capacity_guard(config, CapacityGuard::statvfs())
    }

    pub fn with_capacity_guard(config: &CoreConfig, guard: CapacityGuard) -> Self {
        let resolver = PathResolver::new(config.storage_root());
        let locks = config.session_locks().then(SessionLocks::new);

        Self {
            uploads: UploadAssembler::new(
                resolver.clone(),
                guard,
                config.capacity_policy(),
                locks,
            ),
            downloads: DownloadSegmenter::new(resolver, config.download_window()),
        }
    }

    pub fn uploads(&self) -> &UploadAssembler {
        &self.uploads
    }

    pub fn downloads(&self) -> &DownloadSegmenter {
        &self.downloads
    }

    /// Stores an inbound fragment stream; see [`UploadAssembler::assemble`].
    pub async fn upload<S, E>(&self, fragments: S) -> CoreResult<TransferResult>
    where
        S: Stream<Item = Result<TransferFragment, E>>,
        E: Display,
    {
        self.uploads.assemble(fragments).await
    }

    /// Opens a stored file for streaming; see [`DownloadSegmenter::open`].
    pub async fn download(&self, request: &DownloadRequest) -> CoreResult<DownloadStream> {
        self.downloads.open(request).await
    }
}
