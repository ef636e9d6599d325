use clap::Parser;
use p2p_transport::config::{LoadError, NetworkConfig};
use p2p_transport::node::Identity;
use p2p_transport::service::server::Server;
use p2p_transport::utils::logging::init_logging;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Process exit codes for boot failures
mod exit {
    pub const CONFIG_ACCESS: u8 = 1;
    pub const CONFIG_READ: u8 = 2;
    pub const CONFIG_PARSE: u8 = 3;
    pub const PRIVATE_KEY_CORRUPT: u8 = 4;
    pub const PRIVATE_KEY_MISSING: u8 = 5;
    pub const RUNTIME: u8 = 6;
    pub const BIND: u8 = 7;
    pub const LOGGING: u8 = 8;
}

#[derive(Parser, Debug)]
#[command(name = "p2p-node", version, about = "Peer-to-peer transport node")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "P2P_CONFIG", default_value = "p2p.toml")]
    config: PathBuf,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override multi-threaded event loops
    #[arg(long)]
    multicore: Option<bool>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match NetworkConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(match e {
                LoadError::Access(_) => exit::CONFIG_ACCESS,
                LoadError::Read(_) => exit::CONFIG_READ,
                LoadError::Parse(_) => exit::CONFIG_PARSE,
            });
        }
    };
    config.apply_env();
    apply_args(&mut config, &args);

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::from(exit::LOGGING);
    }

    if config.node.private_key.is_empty() {
        error!("Node private key is missing");
        return ExitCode::from(exit::PRIVATE_KEY_MISSING);
    }
    let identity = match Identity::from_hex(&config.node.private_key) {
        Ok(identity) => identity
            .with_chain(config.node.chain_height, config.node.chain_version)
            .with_features(config.node.validator, config.node.indexer),
        Err(e) => {
            error!(error = %e, "Node private key is corrupt");
            return ExitCode::from(exit::PRIVATE_KEY_CORRUPT);
        }
    };

    for problem in config.validate() {
        tracing::warn!(%problem, "Configuration");
    }

    let runtime = if config.server.multicore {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        if config.server.worker_threads > 0 {
            builder.worker_threads(config.server.worker_threads);
        }
        builder.enable_all().build()
    } else {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
    };
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            return ExitCode::from(exit::RUNTIME);
        }
    };

    runtime.block_on(async move {
        let server = match Server::bind(&config, identity).await {
            Ok(server) => server,
            Err(e) => {
                error!(address = %config.server.address, error = %e, "Failed to bind listener");
                return ExitCode::from(exit::BIND);
            }
        };

        match server.run().await {
            Ok(()) => {
                info!("Bye");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Server failed");
                ExitCode::FAILURE
            }
        }
    })
}

fn apply_args(config: &mut NetworkConfig, args: &Args) {
    if let Some(port) = args.port {
        config.server.address = match config.server.address.parse::<SocketAddr>() {
            Ok(mut addr) => {
                addr.set_port(port);
                addr.to_string()
            }
            Err(_) => format!("0.0.0.0:{port}"),
        };
    }

    if let Some(multicore) = args.multicore {
        config.server.multicore = multicore;
    }
}
