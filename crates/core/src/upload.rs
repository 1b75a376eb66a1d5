//! Inbound upload assembly.
//!
//! An upload session moves through
//!
//! ```text
//! Init ──first fragment──▶ Receiving ──end of input──▶ Finalizing ──▶ Done
//!   │                          │
//!   └──────── any error ───────┴──────────────────────────────────▶ Failed
//! ```
//!
//! The first fragment fixes the owner, file identifier and extension for the session,
//! creates the owner directory, runs the capacity guard and truncate-creates the
//! destination. Every later fragment is appended in arrival order. A failed session leaves
//! whatever it already wrote in place.

use crate::config::CapacityPolicy;
use crate::locks::{SessionGuard, SessionLocks};
use crate::transfer::{TransferFragment, TransferResult};
use crate::{CoreError, CoreResult};
use filestore_files::{CapacityGuard, ChunkWriter, FilesError, PathResolver, StorageId};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadPhase {
    Init,
    Receiving,
    Finalizing,
    Done,
    Failed,
}

/// Assembles inbound fragment streams into stored files.
#[derive(Clone, Debug)]
pub struct UploadAssembler {
    resolver: PathResolver,
    guard: CapacityGuard,
    writer: ChunkWriter,
    policy: CapacityPolicy,
    locks: Option<SessionLocks>,
}

impl UploadAssembler {
    pub fn new(
        resolver: PathResolver,
        guard: CapacityGuard,
        policy: CapacityPolicy,
        locks: Option<SessionLocks>,
    ) -> Self {
        Self {
            resolver,
            guard,
            writer: ChunkWriter,
            policy,
            locks,
        }
    }

    /// Lock table shared by this assembler's sessions, if locking is enabled.
    pub fn locks(&self) -> Option<&SessionLocks> {
        self.locks.as_ref()
    }

    /// Starts a new session in [`UploadPhase::Init`].
    pub fn session(&self) -> UploadSession<'_> {
        UploadSession {
            assembler: self,
            phase: UploadPhase::Init,
            destination: None,
        }
    }

    /// Consumes `fragments` until end of input and stores them as one file.
    ///
    /// An `Err` item from the stream (a transport failure or early close by the peer)
    /// fails the session with [`CoreError::InvalidStream`].
    ///
    /// # Errors
    ///
    /// Returns the first error hit by the session; see [`UploadSession::accept`] and
    /// [`UploadSession::finish`].
    pub async fn assemble<S, E>(&self, fragments: S) -> CoreResult<TransferResult>
    where
        S: Stream<Item = Result<TransferFragment, E>>,
        E: Display,
    {
        let mut fragments = std::pin::pin!(fragments);
        let mut session = self.session();

        while let Some(item) = fragments.next().await {
            let step = match item {
                Ok(fragment) => session.accept(fragment).await,
                Err(e) => Err(session.abort(format!("inbound stream failed: {e}"))),
            };
            if let Err(e) = step {
                tracing::warn!("upload session failed: {}", e);
                return Err(e);
            }
        }

        session.finish()
    }
}

/// State of the file an upload session is writing.
#[derive(Debug)]
struct Destination {
    owner_id: StorageId,
    file_id: StorageId,
    owner_dir: PathBuf,
    path: PathBuf,
    bytes_written: u64,
    fragments: u64,
    _lock: Option<SessionGuard>,
}

/// A single upload, driven one fragment at a time.
#[derive(Debug)]
pub struct UploadSession<'a> {
    assembler: &'a UploadAssembler,
    phase: UploadPhase,
    destination: Option<Destination>,
}

impl UploadSession<'_> {
    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    /// Destination path, once the first fragment has been accepted.
    pub fn path(&self) -> Option<&Path> {
        self.destination.as_ref().map(|d| d.path.as_path())
    }

    pub fn bytes_written(&self) -> u64 {
        self.destination.as_ref().map_or(0, |d| d.bytes_written)
    }

    /// Feeds the next fragment into the session.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidStream`] if the session is already closed, the fragment names a
    ///   different owner or file than the first one, or its offset does not match the
    ///   bytes written so far
    /// - [`CoreError::Files`] for identifier, directory, capacity and write failures
    ///
    /// Any error moves the session to [`UploadPhase::Failed`] and releases its lock.
    pub async fn accept(&mut self, fragment: TransferFragment) -> CoreResult<()> {
        let step = match self.phase {
            UploadPhase::Init => self.begin(fragment).await,
            UploadPhase::Receiving => self.append(fragment).await,
            UploadPhase::Finalizing | UploadPhase::Done | UploadPhase::Failed => {
                return Err(CoreError::InvalidStream(format!(
                    "fragment received after session reached {:?}",
                    self.phase
                )));
            }
        };

        if step.is_err() {
            self.phase = UploadPhase::Failed;
            self.destination = None;
        }
        step
    }

    /// Marks the session failed because the inbound stream broke, returning the error to
    /// report.
    pub fn abort(&mut self, reason: impl Into<String>) -> CoreError {
        self.phase = UploadPhase::Failed;
        self.destination = None;
        CoreError::InvalidStream(reason.into())
    }

    /// Handles end of input.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidStream`] if no fragment was ever accepted or the session
    /// is not receiving.
    pub fn finish(&mut self) -> CoreResult<TransferResult> {
        match self.phase {
            UploadPhase::Receiving => {
                self.phase = UploadPhase::Finalizing;
                let destination = self.destination.take().ok_or_else(|| {
                    CoreError::InvalidStream("receiving session has no destination".into())
                })?;
                tracing::info!(
                    "upload of {}/{} complete: {} bytes in {} fragments",
                    destination.owner_id,
                    destination.file_id,
                    destination.bytes_written,
                    destination.fragments
                );
                self.phase = UploadPhase::Done;
                Ok(TransferResult {
                    file_id: destination.file_id.to_string(),
                })
            }
            UploadPhase::Init => {
                self.phase = UploadPhase::Failed;
                Err(CoreError::InvalidStream(
                    "stream ended before any fragment was received".into(),
                ))
            }
            phase => Err(CoreError::InvalidStream(format!(
                "cannot finish a session in {phase:?}"
            ))),
        }
    }

    async fn begin(&mut self, fragment: TransferFragment) -> CoreResult<()> {
        let assembler = self.assembler;
        let owner_id = StorageId::new(&fragment.owner_id).map_err(FilesError::from)?;
        let file_id = StorageId::file_id(&fragment.file_id).map_err(FilesError::from)?;

        if let Some(offset) = fragment.offset.filter(|&o| o != 0) {
            return Err(CoreError::InvalidStream(format!(
                "first fragment must start at offset 0, got {offset}"
            )));
        }

        let lock = match &assembler.locks {
            Some(locks) => Some(locks.acquire(&owner_id, &file_id).await),
            None => None,
        };

        let owner_dir = assembler.resolver.ensure_owner_dir(&owner_id).await?;
        let path = assembler
            .resolver
            .upload_path(&owner_id, &file_id, &fragment.file_name);

        let payload_len = fragment.payload.len() as u64;
        let required = fragment.expected_size.unwrap_or(0).max(payload_len);
        assembler.guard.ensure(&owner_dir, required)?;

        assembler
            .writer
            .create_and_write(&path, &fragment.payload)
            .await?;
        assembler
            .resolver
            .remove_stale_variants(&owner_id, &file_id, &path)
            .await?;

        tracing::info!(
            "upload of {}/{} started at {}",
            owner_id,
            file_id,
            path.display()
        );

        self.destination = Some(Destination {
            owner_id,
            file_id,
            owner_dir,
            path,
            bytes_written: payload_len,
            fragments: 1,
            _lock: lock,
        });
        self.phase = UploadPhase::Receiving;
        Ok(())
    }

    async fn append(&mut self, fragment: TransferFragment) -> CoreResult<()> {
        let assembler = self.assembler;
        let destination = self.destination.as_mut().ok_or_else(|| {
            CoreError::InvalidStream("receiving session has no destination".into())
        })?;

        if fragment.owner_id != destination.owner_id.as_str()
            || fragment.file_id != destination.file_id.as_str()
        {
            return Err(CoreError::InvalidStream(format!(
                "fragment for {}/{} arrived in the session for {}/{}",
                fragment.owner_id, fragment.file_id, destination.owner_id, destination.file_id
            )));
        }

        if let Some(offset) = fragment.offset {
            if offset != destination.bytes_written {
                return Err(CoreError::InvalidStream(format!(
                    "fragment offset {} does not match {} bytes already written",
                    offset, destination.bytes_written
                )));
            }
        }

        if fragment.payload.is_empty() {
            destination.fragments += 1;
            return Ok(());
        }

        let payload_len = fragment.payload.len() as u64;
        if assembler.policy == CapacityPolicy::PerFragment {
            assembler.guard.ensure(&destination.owner_dir, payload_len)?;
        }

        assembler
            .writer
            .append_write(&destination.path, &fragment.payload)
            .await?;
        destination.bytes_written += payload_len;
        destination.fragments += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filestore_files::SpaceProbe;
    use std::fs;
    use std::io;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Reports a fixed amount of free space that tests can change mid-session.
    #[derive(Debug)]
    struct AdjustableSpace(AtomicU64);

    impl SpaceProbe for AdjustableSpace {
        fn available_bytes(&self, _dir: &Path) -> io::Result<u64> {
            Ok(self.0.load(Ordering::SeqCst))
        }
    }

    fn assembler_with(root: &Path, free: Arc<AdjustableSpace>, policy: CapacityPolicy) -> UploadAssembler {
        UploadAssembler::new(
            PathResolver::new(root),
            CapacityGuard::new(free),
            policy,
            Some(SessionLocks::new()),
        )
    }

    fn roomy(root: &Path) -> UploadAssembler {
        assembler_with(
            root,
            Arc::new(AdjustableSpace(AtomicU64::new(u64::MAX))),
            CapacityPolicy::PerSession,
        )
    }

    fn fragments(parts: &[&[u8]]) -> Vec<Result<TransferFragment, String>> {
        parts
            .iter()
            .map(|p| Ok(TransferFragment::new("alice", "f1", "notes.txt", p.to_vec())))
            .collect()
    }

    #[tokio::test]
    async fn test_phases_through_success() {
        let temp = TempDir::new().unwrap();
        let assembler = roomy(temp.path());
        let mut session = assembler.session();
        assert_eq!(session.phase(), UploadPhase::Init);

        session
            .accept(TransferFragment::new("alice", "f1", "notes.txt", "ab"))
            .await
            .unwrap();
        assert_eq!(session.phase(), UploadPhase::Receiving);
        assert_eq!(session.path(), Some(temp.path().join("alice/f1.txt").as_path()));

        session
            .accept(TransferFragment::new("alice", "f1", "ignored.bin", "cd"))
            .await
            .unwrap();
        assert_eq!(session.bytes_written(), 4);

        let result = session.finish().unwrap();
        assert_eq!(session.phase(), UploadPhase::Done);
        assert_eq!(result.file_id, "f1");
        assert_eq!(fs::read(temp.path().join("alice/f1.txt")).unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn test_assemble_stream() {
        let temp = TempDir::new().unwrap();
        let assembler = roomy(temp.path());

        let result = assembler
            .assemble(futures::stream::iter(fragments(&[b"he", b"", b"llo"])))
            .await
            .unwrap();

        assert_eq!(result.file_id, "f1");
        assert_eq!(fs::read(temp.path().join("alice/f1.txt")).unwrap(), b"hello");
        assert!(assembler.locks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_stream_is_invalid() {
        let temp = TempDir::new().unwrap();
        let assembler = roomy(temp.path());

        let result = assembler
            .assemble(futures::stream::iter(fragments(&[])))
            .await;

        assert!(matches!(result, Err(CoreError::InvalidStream(_))));
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_fails_session_and_keeps_partial_file() {
        let temp = TempDir::new().unwrap();
        let assembler = roomy(temp.path());
        let items = vec![
            Ok(TransferFragment::new("alice", "f1", "notes.txt", "partial")),
            Err("connection reset".to_string()),
            Ok(TransferFragment::new("alice", "f1", "notes.txt", "never")),
        ];

        let result = assembler.assemble(futures::stream::iter(items)).await;

        assert!(matches!(result, Err(CoreError::InvalidStream(ref m)) if m.contains("connection reset")));
        assert_eq!(
            fs::read(temp.path().join("alice/f1.txt")).unwrap(),
            b"partial"
        );
        assert!(assembler.locks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_capacity_shortfall_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let free = Arc::new(AdjustableSpace(AtomicU64::new(3)));
        let assembler = assembler_with(temp.path(), free, CapacityPolicy::PerSession);

        let result = assembler
            .assemble(futures::stream::iter(fragments(&[b"four"])))
            .await;

        assert!(matches!(
            result,
            Err(CoreError::Files(FilesError::ResourceExhausted {
                required: 4,
                available: 3,
                ..
            }))
        ));
        assert!(!temp.path().join("alice/f1.txt").exists());
    }

    #[tokio::test]
    async fn test_expected_size_is_checked_up_front() {
        let temp = TempDir::new().unwrap();
        let free = Arc::new(AdjustableSpace(AtomicU64::new(10)));
        let assembler = assembler_with(temp.path(), free, CapacityPolicy::PerSession);
        let first = TransferFragment::new("alice", "f1", "a.bin", "x").with_expected_size(11);

        let result = assembler
            .assemble(futures::stream::iter(vec![Ok::<_, String>(first)]))
            .await;

        assert!(matches!(
            result,
            Err(CoreError::Files(FilesError::ResourceExhausted { required: 11, .. }))
        ));
        assert!(!temp.path().join("alice/f1.bin").exists());
    }

    #[tokio::test]
    async fn test_session_policy_checks_only_once() {
        let temp = TempDir::new().unwrap();
        let free = Arc::new(AdjustableSpace(AtomicU64::new(100)));
        let assembler = assembler_with(temp.path(), free.clone(), CapacityPolicy::PerSession);
        let mut session = assembler.session();

        session
            .accept(TransferFragment::new("alice", "f1", "a.bin", "first"))
            .await
            .unwrap();
        free.0.store(0, Ordering::SeqCst);
        session
            .accept(TransferFragment::new("alice", "f1", "a.bin", "second"))
            .await
            .unwrap();

        assert!(session.finish().is_ok());
    }

    #[tokio::test]
    async fn test_fragment_policy_rechecks_each_append() {
        let temp = TempDir::new().unwrap();
        let free = Arc::new(AdjustableSpace(AtomicU64::new(100)));
        let assembler = assembler_with(temp.path(), free.clone(), CapacityPolicy::PerFragment);
        let mut session = assembler.session();

        session
            .accept(TransferFragment::new("alice", "f1", "a.bin", "first"))
            .await
            .unwrap();
        free.0.store(0, Ordering::SeqCst);
        let result = session
            .accept(TransferFragment::new("alice", "f1", "a.bin", "second"))
            .await;

        assert!(matches!(
            result,
            Err(CoreError::Files(FilesError::ResourceExhausted { .. }))
        ));
        assert_eq!(session.phase(), UploadPhase::Failed);
        assert_eq!(fs::read(temp.path().join("alice/f1.bin")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_changing_file_id_mid_stream_is_invalid() {
        let temp = TempDir::new().unwrap();
        let assembler = roomy(temp.path());
        let items = vec![
            Ok::<_, String>(TransferFragment::new("alice", "f1", "a.txt", "a")),
            Ok(TransferFragment::new("alice", "f2", "a.txt", "b")),
        ];

        let result = assembler.assemble(futures::stream::iter(items)).await;

        assert!(matches!(result, Err(CoreError::InvalidStream(_))));
        assert!(!temp.path().join("alice/f2.txt").exists());
    }

    #[tokio::test]
    async fn test_offsets_are_checked_when_present() {
        let temp = TempDir::new().unwrap();
        let assembler = roomy(temp.path());
        let mut session = assembler.session();

        session
            .accept(TransferFragment::new("alice", "f1", "a.txt", "abc").with_offset(0))
            .await
            .unwrap();
        session
            .accept(TransferFragment::new("alice", "f1", "a.txt", "de").with_offset(3))
            .await
            .unwrap();
        let gap = session
            .accept(TransferFragment::new("alice", "f1", "a.txt", "zz").with_offset(9))
            .await;

        assert!(matches!(gap, Err(CoreError::InvalidStream(_))));
        assert_eq!(fs::read(temp.path().join("alice/f1.txt")).unwrap(), b"abcde");
    }

    #[tokio::test]
    async fn test_first_fragment_must_start_at_zero() {
        let temp = TempDir::new().unwrap();
        let assembler = roomy(temp.path());
        let mut session = assembler.session();

        let result = session
            .accept(TransferFragment::new("alice", "f1", "a.txt", "abc").with_offset(5))
            .await;

        assert!(matches!(result, Err(CoreError::InvalidStream(_))));
        assert!(!temp.path().join("alice").exists());
    }

    #[tokio::test]
    async fn test_traversal_ids_are_rejected() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        fs::create_dir(&root).unwrap();
        let assembler = roomy(&root);

        for (owner, file) in [("..", "f1"), ("alice", "../../escape"), ("", "f1")] {
            let result = assembler
                .assemble(futures::stream::iter(vec![Ok::<_, String>(
                    TransferFragment::new(owner, file, "x.txt", "data"),
                )]))
                .await;
            assert!(matches!(
                result,
                Err(CoreError::Files(FilesError::InvalidIdentifier(_)))
            ));
        }
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_missing_storage_root_is_directory_error() {
        let temp = TempDir::new().unwrap();
        let assembler = roomy(&temp.path().join("absent"));

        let result = assembler
            .assemble(futures::stream::iter(fragments(&[b"x"])))
            .await;

        assert!(matches!(
            result,
            Err(CoreError::Files(FilesError::DirectoryCreation { .. }))
        ));
    }

    #[tokio::test]
    async fn test_reupload_with_new_extension_replaces_old_variant() {
        let temp = TempDir::new().unwrap();
        let assembler = roomy(temp.path());

        assembler
            .assemble(futures::stream::iter(vec![Ok::<_, String>(
                TransferFragment::new("alice", "f1", "draft.txt", "old"),
            )]))
            .await
            .unwrap();
        assembler
            .assemble(futures::stream::iter(vec![Ok::<_, String>(
                TransferFragment::new("alice", "f1", "final.pdf", "new"),
            )]))
            .await
            .unwrap();

        let owner_dir = temp.path().join("alice");
        assert!(!owner_dir.join("f1.txt").exists());
        assert_eq!(fs::read(owner_dir.join("f1.pdf")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_fragment_after_done_is_rejected() {
        let temp = TempDir::new().unwrap();
        let assembler = roomy(temp.path());
        let mut session = assembler.session();
        session
            .accept(TransferFragment::new("alice", "f1", "a.txt", "a"))
            .await
            .unwrap();
        session.finish().unwrap();

        let late = session
            .accept(TransferFragment::new("alice", "f1", "a.txt", "b"))
            .await;

        assert!(matches!(late, Err(CoreError::InvalidStream(_))));
        assert_eq!(session.phase(), UploadPhase::Done);
    }
}
