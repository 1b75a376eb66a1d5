use filestore_files::FilesError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to prepare storage root: {0}")]
    StorageRoot(std::io::Error),
    #[error("invalid stream: {0}")]
    InvalidStream(String),
    #[error(transparent)]
    Files(#[from] FilesError),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
