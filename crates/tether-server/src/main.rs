use clap::Parser;
use std::sync::Arc;
use tether_core::{CrmConfig, McpConfig, StorageConfig, TetherConfig, Transport};
use tether_mcp::McpServer;
use tether_storage::PgStorage;

#[derive(Parser)]
#[command(
    name = "tether-server",
    version,
    about = "Tether CRM MCP server — CRUD and search tools over stdio or HTTP"
)]
struct Cli {
    /// Postgres connection URL
    #[arg(long, env = "TETHER_DATABASE_URL")]
    database_url: String,

    /// Maximum storage pool connections
    #[arg(long, env = "TETHER_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Transport: "stdio" or "http"
    #[arg(long, env = "TETHER_TRANSPORT", default_value = "stdio")]
    transport: String,

    /// HTTP listen host
    #[arg(long, env = "TETHER_HTTP_HOST", default_value = "127.0.0.1")]
    host: String,

    /// HTTP listen port
    #[arg(long, env = "TETHER_HTTP_PORT", default_value_t = 3000)]
    port: u16,

    /// Author recorded on notes when the caller supplies none
    #[arg(long, env = "TETHER_DEFAULT_AUTHOR", default_value = "mcp")]
    default_author: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Logs go to stderr: stdout carries the stdio transport.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let transport = match cli.transport.as_str() {
        "stdio" => Transport::Stdio,
        "http" => Transport::Http,
        other => anyhow::bail!("unknown transport: {} (expected stdio or http)", other),
    };

    let config = TetherConfig {
        mcp: McpConfig {
            transport,
            host: cli.host,
            port: cli.port,
        },
        storage: StorageConfig {
            database_url: cli.database_url,
            max_connections: cli.max_connections,
        },
        crm: CrmConfig {
            default_author: cli.default_author,
            ..CrmConfig::default()
        },
    };

    let storage = PgStorage::connect(&config.storage.database_url, config.storage.max_connections)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to storage: {}", e))?;
    tracing::info!("connected to storage");

    let server = McpServer::new(config.mcp, Arc::new(storage), config.crm);
    server.run().await?;

    Ok(())
}
