use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
pub struct AggregatorCli {
    /// Path to the TOML configuration file
    #[clap(short, long)]
    pub config: PathBuf,

    /// Load the configuration and definitions, print them and exit without scheduling anything.
    #[clap(long, default_value = "false")]
    pub check: bool,

    /// Serve the read-only definition listing on this address, overriding `listen` from the
    /// configuration file.
    #[clap(long)]
    pub listen: Option<SocketAddr>,
}

/// Initialise logging and parse the command line.
///
/// Logs at `info` unless `RUST_LOG` says otherwise.
pub fn init() -> AggregatorCli {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    AggregatorCli::parse()
}
