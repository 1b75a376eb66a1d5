//! Outbound download segmentation.
//!
//! A stored file is streamed as consecutive windows of at most `window` bytes. Reading is
//! lazy: the next window is only read when the consumer polls for it, so memory use is
//! bounded by one window regardless of file size. The stream ends after the last byte;
//! no empty trailing fragment is emitted.

use crate::transfer::{DownloadFragment, DownloadRequest};
use crate::{CoreError, CoreResult};
use filestore_files::{FilesError, PathResolver, StorageId};
use futures::Stream;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Ordered, finite stream of download fragments.
pub type DownloadStream = Pin<Box<dyn Stream<Item = CoreResult<DownloadFragment>> + Send>>;

#[derive(Clone, Debug)]
pub struct DownloadSegmenter {
    resolver: PathResolver,
    window: usize,
}

impl DownloadSegmenter {
    pub fn new(resolver: PathResolver, window: usize) -> Self {
        Self {
            resolver,
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Resolves and opens the requested file and returns its fragment stream.
    ///
    /// Resolution happens before the stream is returned, so a missing file is reported
    /// here rather than as the first stream item. A read failure part-way through is
    /// yielded as the stream's final item.
    ///
    /// # Errors
    ///
    /// - [`FilesError::InvalidIdentifier`] for unsafe owner or file ids
    /// - [`FilesError::NotFound`] if nothing is stored under the ids
    /// - [`FilesError::Read`] if the file exists but cannot be opened
    pub async fn open(&self, request: &DownloadRequest) -> CoreResult<DownloadStream> {
        let owner_id = StorageId::new(&request.owner_id).map_err(FilesError::from)?;
        let file_id = StorageId::file_id(&request.file_id).map_err(FilesError::from)?;

        let path = self
            .resolver
            .locate(&owner_id, &file_id, &request.file_name)
            .await?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FilesError::NotFound(format!("{}/{}", owner_id, file_id)).into());
            }
            Err(source) => return Err(FilesError::Read { path, source }.into()),
        };

        tracing::info!(
            "download of {}/{} started from {}",
            owner_id,
            file_id,
            path.display()
        );
        Ok(segments(file, path, file_id.to_string(), self.window))
    }
}

struct SegmentState<R> {
    reader: Option<R>,
    path: PathBuf,
    file_id: String,
    window: usize,
    sent: u64,
}

/// Turns `reader` into a stream of fragments of at most `window` bytes.
fn segments<R>(reader: R, path: PathBuf, file_id: String, window: usize) -> DownloadStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let state = SegmentState {
        reader: Some(reader),
        path,
        file_id,
        window,
        sent: 0,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        let Some(mut reader) = state.reader.take() else {
            return None;
        };
        let mut buf = vec![0u8; state.window];

        match fill_window(&mut reader, &mut buf).await {
            Ok(0) => {
                tracing::info!(
                    "download of {} complete: {} bytes",
                    state.file_id,
                    state.sent
                );
                None
            }
            Ok(n) => {
                buf.truncate(n);
                state.sent += n as u64;
                state.reader = Some(reader);
                let fragment = DownloadFragment {
                    file_id: state.file_id.clone(),
                    payload: buf,
                };
                Some((Ok(fragment), state))
            }
            Err(source) => {
                tracing::warn!(
                    "download of {} aborted after {} bytes: {}",
                    state.file_id,
                    state.sent,
                    source
                );
                let err = FilesError::Read {
                    path: state.path.clone(),
                    source,
                };
                Some((Err(CoreError::from(err)), state))
            }
        }
    }))
}

/// Reads until `buf` is full or the reader is exhausted.
async fn fill_window<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
