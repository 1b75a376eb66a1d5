//! Storage path derivation
//!
//! A stored file's location is a pure function of its owner, its file identifier and the
//! extension of the name it was uploaded under:
//!
//! ```text
//! <storage_root>/<owner_id>/<file_id><ext>
//! ```
//!
//! Downloads may not know the extension, so [`PathResolver::locate`] falls back to scanning
//! the owner directory for an entry carrying the file identifier. Uploads keep that scan
//! unambiguous by removing other extensions of the same identifier when a file is created
//! (see [`PathResolver::remove_stale_variants`]).
//!
//! File identifiers must come from [`StorageId::file_id`]. They contain no dots, so the stem
//! of a stored name before its first dot names exactly one identifier.

use crate::{FilesError, FilesResult, StorageId};
use std::io;
use std::path::{Path, PathBuf};

/// Resolves owner directories and stored file paths below a storage root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Creates a resolver rooted at `root`.
    ///
    /// No I/O happens here; the root is expected to exist by the time an owner directory
    /// is created beneath it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory holding every file stored for `owner_id`.
    #[must_use]
    pub fn owner_dir(&self, owner_id: &StorageId) -> PathBuf {
        self.root.join(owner_id.as_str())
    }

    /// Returns the destination path for an upload of `file_id` named `file_name`.
    #[must_use]
    pub fn upload_path(&self, owner_id: &StorageId, file_id: &StorageId, file_name: &str) -> PathBuf {
        self.owner_dir(owner_id)
            .join(stored_name(file_id, extension_of(file_name)))
    }

    /// Creates the owner directory if it is not already present.
    ///
    /// The storage root itself is not created: a missing root is reported as
    /// [`FilesError::DirectoryCreation`]. A directory created concurrently by another
    /// session counts as success.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::DirectoryCreation`] if the directory cannot be created or the
    /// path is taken by something that is not a directory.
    pub async fn ensure_owner_dir(&self, owner_id: &StorageId) -> FilesResult<PathBuf> {
        let dir = self.owner_dir(owner_id);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {
                tracing::debug!("created owner directory {}", dir.display());
                Ok(dir)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let is_dir = tokio::fs::metadata(&dir)
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false);
                if is_dir {
                    Ok(dir)
                } else {
                    Err(FilesError::DirectoryCreation {
                        path: dir,
                        source: io::Error::new(
                            io::ErrorKind::AlreadyExists,
                            "path exists and is not a directory",
                        ),
                    })
                }
            }
            Err(source) => Err(FilesError::DirectoryCreation { path: dir, source }),
        }
    }

    /// Locates the stored file for `file_id`.
    ///
    /// If `file_name` carries an extension and `<file_id><ext>` exists, that file is
    /// returned directly. Otherwise the owner directory is scanned for entries named
    /// `<file_id>` or `<file_id>.<ext>`, and the lexicographically first one wins.
    ///
    /// # Errors
    ///
    /// - [`FilesError::NotFound`] if the owner directory or a matching file is absent
    /// - [`FilesError::Read`] if the owner directory cannot be listed
    pub async fn locate(
        &self,
        owner_id: &StorageId,
        file_id: &StorageId,
        file_name: &str,
    ) -> FilesResult<PathBuf> {
        let dir = self.owner_dir(owner_id);
        let not_found = || FilesError::NotFound(format!("{}/{}", owner_id, file_id));

        let ext = extension_of(file_name);
        if !ext.is_empty() {
            let exact = dir.join(stored_name(file_id, ext));
            if is_file(&exact).await {
                return Ok(exact);
            }
        }

        if !is_dir(&dir).await {
            return Err(not_found());
        }

        let candidates = scan_variants(&dir, file_id).await?;
        candidates
            .into_iter()
            .next()
            .map(|name| dir.join(name))
            .ok_or_else(not_found)
    }

    /// Removes every stored variant of `file_id` other than `keep`.
    ///
    /// Returns the number of files removed. Entries that disappear while being removed are
    /// not an error.
    ///
    /// # Errors
    ///
    /// - [`FilesError::Read`] if the owner directory cannot be listed
    /// - [`FilesError::Write`] if a stale file cannot be removed
    pub async fn remove_stale_variants(
        &self,
        owner_id: &StorageId,
        file_id: &StorageId,
        keep: &Path,
    ) -> FilesResult<usize> {
        let dir = self.owner_dir(owner_id);
        let mut removed = 0;
        for name in scan_variants(&dir, file_id).await? {
            let path = dir.join(&name);
            if path == keep {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!("removed stale variant {}", path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(FilesError::Write { path, source }),
            }
        }
        Ok(removed)
    }
}

/// Returns the extension of `file_name`, including the leading dot.
///
/// Only the final path component is considered and only its last `.`-suffix is kept, so
/// `"dir/archive.tar.gz"` yields `".gz"`. A name without a dot yields `""`.
pub fn extension_of(file_name: &str) -> &str {
    let base = file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name);
    match base.rfind('.') {
        Some(idx) => &base[idx..],
        None => "",
    }
}

/// Returns the on-disk file name for `file_id` with extension `ext`.
pub fn stored_name(file_id: &StorageId, ext: &str) -> String {
    format!("{}{}", file_id, ext)
}

/// Whether `entry_name` is `file_id` followed by nothing or by a single extension.
///
/// File ids carry no dots, so the stem before the first dot is the id the entry was stored
/// under; an entry can therefore be a variant of at most one id.
fn is_variant_of(entry_name: &str, file_id: &str) -> bool {
    match entry_name.split_once('.') {
        None => entry_name == file_id,
        Some((stem, tail)) => stem == file_id && !tail.contains('.'),
    }
}

/// Lists regular files in `dir` that are variants of `file_id`, sorted by name.
async fn scan_variants(dir: &Path, file_id: &StorageId) -> FilesResult<Vec<String>> {
    let read_err = |source| FilesError::Read {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_err)?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if !is_variant_of(&name, file_id.as_str()) {
            continue;
        }
        let regular = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if regular {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
