//! gRPC server assembly.

use crate::service::FileStoreService;
use api_shared::pb::file_service_server::FileServiceServer;
use api_shared::FILE_DESCRIPTOR_SET;
use filestore_core::FileTransferService;
use std::time::Duration;
use tonic::transport::server::Router;
use tonic::transport::Server;

/// Largest single gRPC message accepted or sent (1 GiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024 * 1024;

/// Default keepalive period for client connections.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Transport settings for the hosting gRPC server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub max_message_bytes: usize,
    pub connection_timeout: Duration,
    pub enable_reflection: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            enable_reflection: false,
        }
    }
}

/// Builds a router serving `FileService` backed by `transfer`.
///
/// The caller decides how to serve it (`serve(addr)` or `serve_with_incoming`).
pub fn build_router(transfer: FileTransferService, config: &ServerConfig) -> anyhow::Result<Router> {
    let file_service = FileServiceServer::new(FileStoreService::new(transfer))
        .max_decoding_message_size(config.max_message_bytes)
        .max_encoding_message_size(config.max_message_bytes);

    let reflection_service = if config.enable_reflection {
        tracing::info!("gRPC server reflection enabled");
        Some(
            tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
                .build_v1()?,
        )
    } else {
        tracing::info!("gRPC server reflection disabled");
        None
    };

    let router = Server::builder()
        .tcp_keepalive(Some(config.connection_timeout))
        .http2_keepalive_interval(Some(config.connection_timeout))
        .add_service(file_service)
        .add_optional_service(reflection_service);

    Ok(router)
}
