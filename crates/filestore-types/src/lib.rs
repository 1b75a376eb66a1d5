//! Validated identifier types shared by the file store crates.
//!
//! Owner and file identifiers arrive from remote callers and are used verbatim as path
//! components under the storage root. [`StorageId`] guarantees that such a value can never
//! name anything outside its parent directory.

/// Errors that can occur when creating validated identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input was empty or contained only whitespace
    #[error("identifier cannot be empty")]
    Empty,

    /// The input is a relative path component (`.` or `..`)
    #[error("identifier cannot be a relative path component: {0}")]
    RelativeComponent(String),

    /// The input contains a path separator or NUL byte
    #[error("identifier contains a forbidden character {ch:?}: {value}")]
    ForbiddenCharacter { value: String, ch: char },

    /// A file identifier contains `.`, which would blur it with a stored extension
    #[error("file identifier cannot contain '.': {0}")]
    DottedFileId(String),
}

/// A single, safe path component used to identify an owner or a file.
///
/// Unlike free text, identifiers are not trimmed: `" a"` and `"a"` are distinct ids.
/// Construction rejects:
/// - empty or whitespace-only input
/// - `.` and `..`
/// - `/`, `\` and NUL anywhere in the value
///
/// File identifiers are built with [`StorageId::file_id`], which also rejects `.`: a stored
/// file is named `<file_id><ext>`, so the first dot of a stored name must start the extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageId(String);

impl StorageId {
    /// Creates a new `StorageId` from the given input.
    ///
    /// # Errors
    ///
    /// Returns an [`IdError`] describing the first rule the input breaks.
    pub fn new(input: impl AsRef<str>) -> Result<Self, IdError> {
        let value = input.as_ref();
        if value.trim().is_empty() {
            return Err(IdError::Empty);
        }
        if value == "." || value == ".." {
            return Err(IdError::RelativeComponent(value.to_owned()));
        }
        if let Some(ch) = value.chars().find(|c| matches!(c, '/' | '\\' | '\0')) {
            return Err(IdError::ForbiddenCharacter {
                value: value.to_owned(),
                ch,
            });
        }
        Ok(Self(value.to_owned()))
    }

    /// Creates a file identifier: a [`StorageId`] that also contains no `.`.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::DottedFileId`] for dotted input, or whatever [`StorageId::new`]
    /// rejects.
    pub fn file_id(input: impl AsRef<str>) -> Result<Self, IdError> {
        let id = Self::new(input)?;
        if id.0.contains('.') {
            return Err(IdError::DottedFileId(id.0));
        }
        Ok(id)
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StorageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for StorageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for StorageId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
