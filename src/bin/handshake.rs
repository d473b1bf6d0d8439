//! Handshake CLI binary.
//!
//! Version negotiation for node-to-node connections.
//!
//! # Commands
//!
//! - `versions` - Print the local version table
//! - `propose` - Print the local PROPOSE message as hex CBOR
//! - `decode` - Decode a hex CBOR handshake message
//! - `listen` - Accept TCP connections and handshake each one
//! - `connect` - Dial a peer and run the initiator side

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use handshake::{
    codec,
    config::Config,
    protocol::{Message, VersionTable},
    transport::{self, HandshakeServer},
    VERSION,
};

#[derive(Parser)]
#[command(name = "handshake")]
#[command(version = VERSION)]
#[command(about = "Version-negotiation handshake for node-to-node connections", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/handshake/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the network magic
    #[arg(short, long, global = true, allow_negative_numbers = true)]
    magic: Option<i64>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the local version table
    Versions {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the local PROPOSE message as hex CBOR
    Propose,

    /// Decode a hex CBOR handshake message
    Decode {
        /// Hex-encoded message bytes
        hex: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Accept TCP connections and handshake each one
    Listen {
        /// Listen address (overrides config)
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Dial a peer and run the initiator side
    Connect {
        /// Peer address (host:port)
        addr: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config, cli.magic)?;

    match cli.command {
        Commands::Versions { json } => cmd_versions(&config, json),
        Commands::Propose => cmd_propose(&config),
        Commands::Decode { hex, json } => cmd_decode(&hex, json),
        Commands::Listen { addr } => cmd_listen(config, addr),
        Commands::Connect { addr } => cmd_connect(&config, &addr),
    }
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>, magic: Option<i64>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::load_default()?,
    }
    .with_env();

    if let Some(magic) = magic {
        config.network.magic = magic;
    }

    tracing::debug!(?config, "loaded config");
    Ok(config)
}

fn cmd_versions(config: &Config, json_output: bool) -> anyhow::Result<()> {
    let versions = config.versions();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&versions)?);
    } else {
        print_table(&versions);
    }

    Ok(())
}

fn cmd_propose(config: &Config) -> anyhow::Result<()> {
    let bytes = codec::encode(&Message::propose(config.network.magic))?;
    println!("{}", hex::encode(bytes));
    Ok(())
}

fn cmd_decode(input: &str, json_output: bool) -> anyhow::Result<()> {
    let bytes = hex::decode(input.trim())?;
    let message = codec::decode(&bytes)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&message)?);
        return Ok(());
    }

    match &message {
        Message::Propose(versions) => {
            println!("PROPOSE ({} version(s))", versions.len());
            print_table(versions);
        },
        Message::Accept { version, params } => {
            println!("ACCEPT version {version} params {params}");
        },
        Message::Refuse(rejection) => {
            println!("REFUSE: {rejection}");
        },
    }

    Ok(())
}

fn cmd_listen(mut config: Config, addr: Option<String>) -> anyhow::Result<()> {
    if let Some(addr) = addr {
        config.transport.listen = addr;
    }

    let server = HandshakeServer::from_config(&config)?;
    tracing::info!("Network magic: {}", config.network.magic);
    tracing::info!("Versions: {:?}", server.versions().versions());
    if config.policy.enforce_magic {
        tracing::info!("Magic check: enabled");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(&config.transport.listen).await?;
        server.serve(listener).await?;
        Ok::<_, anyhow::Error>(())
    })
}

fn cmd_connect(config: &Config, addr: &str) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let agreed = runtime.block_on(transport::connect(addr, config))?;

    println!("Agreed version {} params {}", agreed.version, agreed.params);
    Ok(())
}

fn print_table(versions: &VersionTable) {
    for version in versions.versions() {
        if let Some(params) = versions.get(version) {
            println!("  {version:>3}  {:<6}  {params}", params.shape().name());
        }
    }
}
