//! # API Shared
//!
//! Wire definitions for the file store.
//!
//! Contains:
//! - Protobuf-generated message types and the `FileService` server/client (`pb` module)
//! - The encoded file-descriptor set used for gRPC reflection
//!
//! Used by `api-grpc` and by Rust clients of the store.

// Re-export the generated protobuf module. The generated code will be placed
// into OUT_DIR at build time by the build script.
pub mod pb {
    tonic::include_proto!("filestore.v1");
}

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("proto_descriptor");

pub use pb::*;
