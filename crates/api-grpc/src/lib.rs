//! # API gRPC
//!
//! gRPC server implementation for the file store.
//!
//! Handles:
//! - `FileService` implementation on top of `filestore-core` transfer sessions
//! - Mapping session failures onto gRPC status codes
//! - Server assembly (message size limits, keepalive, optional reflection)
//!
//! Uses `api-shared` for the generated protobuf types.

#![warn(rust_2018_idioms)]

pub use server::{build_router, ServerConfig};
pub use service::{pb, status_from_error, FileStoreService};

pub mod server;
pub mod service;
