use clap::Parser;
use ferrous_forward_domain::CliOverrides;
use ferrous_forward_infrastructure::dns::DnsServerHandler;
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod bootstrap;
mod server;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "ferrous-forward")]
#[command(version)]
#[command(about = "Ferrous Forward - DNS forwarder with upstream health checking and failover")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// DNS server port
    #[arg(short = 'd', long)]
    dns_port: Option<u16>,

    /// Bind address
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Upstream for the root zone; replaces the configured rules (repeatable)
    #[arg(short = 'u', long = "upstream", value_name = "ADDR")]
    upstreams: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cli_overrides = CliOverrides {
        dns_port: cli.dns_port,
        bind_address: cli.bind.clone(),
        log_level: cli.log_level.clone(),
        upstreams: cli.upstreams.clone(),
    };

    let config = bootstrap::load_config(cli.config.as_deref(), cli_overrides)?;

    bootstrap::init_logging(&config);

    info!("Starting Ferrous Forward v{}", env!("CARGO_PKG_VERSION"));

    let chain = bootstrap::build_chain(&config).await?;
    for forwarder in &chain.forwarders {
        forwarder.start();
    }

    let shutdown = CancellationToken::new();
    let dns_addr = format!("{}:{}", config.server.bind_address, config.server.dns_port);
    let handler = DnsServerHandler::new(chain.head.clone());

    let server_shutdown = shutdown.clone();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server::start_dns_server(dns_addr, handler, server_shutdown).await {
            error!(error = %e, "DNS server error");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    shutdown.cancel();
    let _ = server_task.await;

    for forwarder in &chain.forwarders {
        forwarder.close().await;
    }

    info!("Server shutdown complete");
    Ok(())
}
