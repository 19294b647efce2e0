//! Canopy Gateway - module and provider registry

use canopy_gateway::config::BackendEndpoints;
use canopy_gateway::{run_server_with_shutdown, GatewayConfig};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "canopy-gateway")]
#[command(about = "Gateway for the Canopy module and provider registry")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "CANOPY_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "CANOPY_PORT")]
    port: u16,

    /// Bucket holding module and provider artifacts
    #[arg(long, default_value = "terrarium-modules", env = "CANOPY_BUCKET")]
    bucket: String,

    /// Region of the bucket
    #[arg(long, default_value = "eu-west-1", env = "CANOPY_REGION")]
    region: String,

    /// Download chunk size in bytes
    #[arg(long, default_value_t = canopy_objectstore::DEFAULT_CHUNK_SIZE, env = "CANOPY_CHUNK_SIZE")]
    chunk_size: usize,

    /// S3-compatible endpoint (MinIO, LocalStack)
    #[arg(long, env = "CANOPY_S3_ENDPOINT")]
    s3_endpoint: Option<String>,

    /// S3 access key id
    #[arg(long, env = "CANOPY_S3_ACCESS_KEY_ID")]
    s3_access_key_id: Option<String>,

    /// S3 secret access key
    #[arg(long, env = "CANOPY_S3_SECRET_ACCESS_KEY", hide_env_values = true)]
    s3_secret_access_key: Option<String>,

    /// Use in-memory storage (for testing, data will not persist)
    #[arg(long, env = "CANOPY_MEMORY_STORE")]
    memory_store: bool,

    /// Mount path of the module registry protocol
    #[arg(long, default_value = "/modules", env = "CANOPY_MOUNT_PATH")]
    mount_path: String,

    /// Mount path of the provider registry protocol
    #[arg(long, default_value = "/providers", env = "CANOPY_PROVIDER_MOUNT_PATH")]
    provider_mount_path: String,

    /// Registrar service address
    #[arg(long, default_value = "registrar:3001", env = "CANOPY_REGISTRAR")]
    registrar: String,

    /// Module version manager address
    #[arg(long, default_value = "version_manager:3001", env = "CANOPY_VERSION_MANAGER")]
    version_manager: String,

    /// Provider version manager address
    #[arg(
        long,
        default_value = "provider_version_manager:3001",
        env = "CANOPY_PROVIDER_VERSION_MANAGER"
    )]
    provider_version_manager: String,

    /// Dependency manager address
    #[arg(long, default_value = "dependency_manager:3001", env = "CANOPY_DEPENDENCY_MANAGER")]
    dependency_manager: String,

    /// Storage service address
    #[arg(long, default_value = "storage:3001", env = "CANOPY_STORAGE")]
    storage: String,

    /// Release service address
    #[arg(long, default_value = "release:3001", env = "CANOPY_RELEASE")]
    release: String,

    /// Enable debug logging
    #[arg(short, long, env = "CANOPY_DEBUG")]
    debug: bool,
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "canopy_gateway={level},canopy_core={level},canopy_objectstore={level},tower_http=debug",
                    level = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Canopy gateway on {}:{}", args.host, args.port);

    let config = GatewayConfig {
        host: args.host,
        port: args.port,
        bucket: args.bucket,
        region: args.region,
        chunk_size: args.chunk_size,
        s3_endpoint: args.s3_endpoint,
        s3_access_key_id: args.s3_access_key_id,
        s3_secret_access_key: args.s3_secret_access_key,
        use_memory_store: args.memory_store,
        mount_path: args.mount_path,
        provider_mount_path: args.provider_mount_path,
        endpoints: BackendEndpoints {
            registrar: args.registrar,
            version_manager: args.version_manager,
            provider_version_manager: args.provider_version_manager,
            dependency_manager: args.dependency_manager,
            storage: args.storage,
            release: args.release,
        },
    };

    run_server_with_shutdown(config, shutdown_signal()).await
}
