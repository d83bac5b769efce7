//! Binary entrypoint for the binkp mailer.
//!
//! Commands:
//! - `answer [--port <port>]` - accept inbound sessions until interrupted
//! - `call <address>` - send the outbound spool of `address` and collect its mail
//! - `init` - write a starter configuration file
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{info, warn};

use binkp::client;
use binkp::config::BinkConfig;
use binkp::server::{BinkServer, ConfigSessionFactory, ServerConfig};
use binkp::transfer::{DirectorySink, OutboundQueue};

#[derive(Parser)]
#[command(name = "binkp")]
#[command(about = "binkp mailer for bulletin-board networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "binkp.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer inbound sessions
    Answer {
        /// Listen port, overriding the configuration
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Call a node from the callout list
    Call {
        /// Node address, e.g. 1:234/5@fidonet
        address: String,
    },
    /// Write a starter configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match cli.command {
        Commands::Init => {
            if std::path::Path::new(&cli.config).exists() {
                bail!("{} already exists", cli.config);
            }
            BinkConfig::create_default(&cli.config)
                .await
                .with_context(|| format!("creating {}", cli.config))?;
            info!("wrote {}", cli.config);
        }
        Commands::Answer { port } => {
            let mut config = load_config(&cli.config).await?;
            if let Some(port) = port {
                config.binkp.port = port;
            }
            answer(config).await?;
        }
        Commands::Call { address } => {
            let config = load_config(&cli.config).await?;
            call(config, &address).await?;
        }
    }
    Ok(())
}

fn init_logger(verbose: u8) {
    let mut builder = env_logger::Builder::new();
    let base_level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    builder.format_timestamp_secs();
    builder.init();
}

async fn load_config(path: &str) -> Result<BinkConfig> {
    BinkConfig::load(path)
        .await
        .with_context(|| format!("loading configuration from {}", path))
}

async fn answer(config: BinkConfig) -> Result<()> {
    let server = BinkServer::bind(
        ServerConfig::from(&config),
        ConfigSessionFactory::new(config),
    )
    .await
    .context("starting server")?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted");
            shutdown.shutdown();
        }
    });

    server.serve().await.context("serving")?;
    Ok(())
}

async fn call(config: BinkConfig, address: &str) -> Result<()> {
    let spool = config.outbound_spool(address);
    let queue = if spool.is_dir() {
        OutboundQueue::from_spool(&spool)
            .with_context(|| format!("reading outbound spool {}", spool.display()))?
    } else {
        info!("no outbound spool at {}", spool.display());
        OutboundQueue::new()
    };
    info!("{} file(s) queued for {}", queue.len(), address);

    let sink = DirectorySink::new(&config.binkp.inbound_dir).with_context(|| {
        format!(
            "preparing inbound directory {}",
            config.binkp.inbound_dir.display()
        )
    })?;

    let outcome = client::call(&config, address, queue, sink).await;
    let left = outcome.queue.into_remaining();
    if !left.is_empty() {
        warn!("{} file(s) stay queued for {}", left.len(), address);
    }
    let report = outcome
        .result
        .with_context(|| format!("session with {}", address))?;
    info!("{}", report.summary());
    Ok(())
}
