//! Transport-independent transfer messages.

/// One unit of an inbound upload stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferFragment {
    pub owner_id: String,
    pub file_id: String,
    /// Only the extension is used, and only from the first fragment.
    pub file_name: String,
    pub payload: Vec<u8>,
    /// Byte offset of `payload` within the file, checked when present.
    pub offset: Option<u64>,
    /// Total size the client intends to upload; read from the first fragment only.
    pub expected_size: Option<u64>,
}

impl TransferFragment {
    pub fn new(
        owner_id: impl Into<String>,
        file_id: impl Into<String>,
        file_name: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            file_id: file_id.into(),
            file_name: file_name.into(),
            payload: payload.into(),
            offset: None,
            expected_size: None,
        }
    }

    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn with_expected_size(mut self, expected_size: u64) -> Self {
        self.expected_size = Some(expected_size);
        self
    }
}

/// Acknowledgement returned once an upload stream has been fully stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferResult {
    pub file_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadRequest {
    pub owner_id: String,
    pub file_id: String,
    /// Optional hint; its extension short-cuts the directory scan.
    pub file_name: String,
}

/// One window of a stored file, emitted in offset order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadFragment {
    pub file_id: String,
    pub payload: Vec<u8>,
}
