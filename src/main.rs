use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use api_grpc::{ServerConfig, build_router};
use filestore_core::config::{
    capacity_policy_from_env_value, download_window_from_env_value, flag_from_env_value,
    storage_root_from_env_value,
};
use filestore_core::{CoreConfig, CoreError, FileTransferService};

/// Main entry point for the file store
///
/// Resolves configuration once, prepares the storage root and serves `FileService` over
/// gRPC until the process is stopped.
///
/// # Environment Variables
/// - `FILESTORE_ADDR`: gRPC server address (default: "0.0.0.0:50051")
/// - `FILESTORE_STORAGE_ROOT`: root of the owner directories (default: "./nfs/files")
/// - `FILESTORE_DOWNLOAD_WINDOW_BYTES`: download fragment size (default: 1048576)
/// - `FILESTORE_CAPACITY_POLICY`: "session" or "fragment" (default: "session")
/// - `FILESTORE_SESSION_LOCKS`: serialize uploads per (owner, file) (default: "true")
/// - `FILESTORE_MAX_MESSAGE_BYTES`: largest gRPC message (default: 1073741824)
/// - `FILESTORE_CONNECTION_TIMEOUT_SECS`: connection keepalive period (default: 300)
/// - `FILESTORE_ENABLE_REFLECTION`: expose gRPC reflection (default: "false")
///
/// # Returns
/// * `Ok(())` - If the server shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration is invalid or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(log_filter()?)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let env = |key: &str| std::env::var(key).ok();

    let addr: SocketAddr = parse_setting(
        "FILESTORE_ADDR",
        &env("FILESTORE_ADDR").unwrap_or_else(|| "0.0.0.0:50051".into()),
    )?;

    let core_config = CoreConfig::new(
        storage_root_from_env_value(env("FILESTORE_STORAGE_ROOT")),
        download_window_from_env_value(env("FILESTORE_DOWNLOAD_WINDOW_BYTES"))?,
        capacity_policy_from_env_value(env("FILESTORE_CAPACITY_POLICY"))?,
        flag_from_env_value(env("FILESTORE_SESSION_LOCKS"), true)?,
    )?;
    core_config.prepare_storage_root()?;

    let mut server_config = ServerConfig {
        enable_reflection: flag_from_env_value(env("FILESTORE_ENABLE_REFLECTION"), false)?,
        ..ServerConfig::default()
    };
    if let Some(bytes) = env("FILESTORE_MAX_MESSAGE_BYTES") {
        server_config.max_message_bytes = parse_setting("FILESTORE_MAX_MESSAGE_BYTES", &bytes)?;
    }
    if let Some(secs) = env("FILESTORE_CONNECTION_TIMEOUT_SECS") {
        server_config.connection_timeout =
            Duration::from_secs(parse_setting("FILESTORE_CONNECTION_TIMEOUT_SECS", &secs)?);
    }

    tracing::info!(
        "++ Storing files under {} (window {} bytes, capacity policy {:?}, session locks {})",
        core_config.storage_root().display(),
        core_config.download_window(),
        core_config.capacity_policy(),
        core_config.session_locks()
    );
    tracing::info!("++ Starting file store gRPC on {}", addr);

    let transfer = FileTransferService::new(&core_config);
    build_router(transfer, &server_config)?.serve(addr).await?;

    Ok(())
}

/// `RUST_LOG` plus `info` for every workspace crate.
fn log_filter() -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive("filestore=info".parse()?)
        .add_directive("api_grpc=info".parse()?))
}

fn parse_setting<T>(key: &str, value: &str) -> Result<T, CoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| CoreError::InvalidConfig(format!("{key}={value:?}: {e}")))
}
