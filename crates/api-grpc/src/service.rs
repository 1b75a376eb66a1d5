// Re-export the proto module from the shared `api-shared` crate so callers
// can reference `api_grpc::pb`.
pub use api_shared::pb;

use api_shared::pb::file_service_server::FileService;
use filestore_core::{
    CoreError, DownloadRequest, FileTransferService, FilesError, TransferFragment,
};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tonic::{Request, Response, Status, Streaming};

/// gRPC front for [`FileTransferService`].
#[derive(Clone, Debug)]
pub struct FileStoreService {
    transfer: FileTransferService,
}

impl FileStoreService {
    pub fn new(transfer: FileTransferService) -> Self {
        Self { transfer }
    }
}

#[tonic::async_trait]
impl FileService for FileStoreService {
    async fn upload(
        &self,
        req: Request<Streaming<pb::TransferFragment>>,
    ) -> Result<Response<pb::TransferResult>, Status> {
        let fragments = req
            .into_inner()
            .map(|item| item.map(fragment_from_pb));

        match self.transfer.upload(fragments).await {
            Ok(result) => Ok(Response::new(pb::TransferResult {
                file_id: result.file_id,
            })),
            Err(e) => Err(status_from_error(&e)),
        }
    }

    type DownloadStream =
        Pin<Box<dyn Stream<Item = Result<pb::DownloadFragment, Status>> + Send + 'static>>;

    async fn download(
        &self,
        req: Request<pb::DownloadRequest>,
    ) -> Result<Response<Self::DownloadStream>, Status> {
        let req = req.into_inner();
        let request = DownloadRequest {
            owner_id: req.owner_id,
            file_id: req.file_id,
            file_name: req.file_name,
        };

        let fragments = self
            .transfer
            .download(&request)
            .await
            .map_err(|e| status_from_error(&e))?;

        let out = fragments.map(|item| {
            item.map(|fragment| pb::DownloadFragment {
                file_id: fragment.file_id,
                payload: fragment.payload,
            })
            .map_err(|e| status_from_error(&e))
        });
        Ok(Response::new(Box::pin(out)))
    }
}

fn fragment_from_pb(msg: pb::TransferFragment) -> TransferFragment {
    TransferFragment {
        owner_id: msg.owner_id,
        file_id: msg.file_id,
        file_name: msg.file_name,
        payload: msg.payload,
        offset: msg.offset,
        expected_size: msg.expected_size,
    }
}

/// Maps a session failure onto the gRPC status returned to the caller.
pub fn status_from_error(err: &CoreError) -> Status {
    let message = err.to_string();
    match err {
        CoreError::InvalidStream(_) | CoreError::Files(FilesError::InvalidIdentifier(_)) => {
            Status::invalid_argument(message)
        }
        CoreError::Files(FilesError::NotFound(_)) => Status::not_found(message),
        CoreError::Files(FilesError::ResourceExhausted { .. }) => {
            Status::resource_exhausted(message)
        }
        CoreError::Files(_) | CoreError::InvalidConfig(_) | CoreError::StorageRoot(_) => {
            Status::internal(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filestore_core::IdError;
    use std::io;
    use std::path::PathBuf;
    use tonic::Code;

    #[test]
    fn test_status_codes() {
        let io_err = || io::Error::new(io::ErrorKind::Other, "boom");
        let cases = vec![
            (CoreError::InvalidStream("eof".into()), Code::InvalidArgument),
            (
                CoreError::Files(FilesError::InvalidIdentifier(IdError::Empty)),
                Code::InvalidArgument,
            ),
            (
                CoreError::Files(FilesError::NotFound("a/b".into())),
                Code::NotFound,
            ),
            (
                CoreError::Files(FilesError::ResourceExhausted {
                    path: PathBuf::from("/x"),
                    required: 2,
                    available: 1,
                }),
                Code::ResourceExhausted,
            ),
            (
                CoreError::Files(FilesError::Write {
                    path: PathBuf::from("/x"),
                    source: io_err(),
                }),
                Code::Internal,
            ),
            (
                CoreError::Files(FilesError::Read {
                    path: PathBuf::from("/x"),
                    source: io_err(),
                }),
                Code::Internal,
            ),
            (
                CoreError::Files(FilesError::DirectoryCreation {
                    path: PathBuf::from("/x"),
                    source: io_err(),
                }),
                Code::Internal,
            ),
        ];

        for (err, code) in cases {
            assert_eq!(status_from_error(&err).code(), code, "{err}");
        }
    }

    #[test]
    fn test_fragment_from_pb_keeps_optional_fields() {
        let fragment = fragment_from_pb(pb::TransferFragment {
            owner_id: "o".into(),
            file_id: "f".into(),
            file_name: "n.txt".into(),
            payload: vec![1, 2],
            offset: Some(4),
            expected_size: None,
        });

        assert_eq!(fragment.offset, Some(4));
        assert_eq!(fragment.expected_size, None);
        assert_eq!(fragment.payload, vec![1, 2]);
    }
}
