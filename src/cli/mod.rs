//! Command-line interface.
//!
//! # Commands
//!
//! - `serve` - Start the gateway
//! - `config init` - Write an example configuration file
//!
//! # Example
//!
//! ```bash
//! # Start with two backend keys on the default port
//! AUTH=key-a,key-b commandr-proxy serve
//!
//! # Generate a config file to edit
//! commandr-proxy config init -o commandr-proxy.toml
//! ```

pub mod config;
pub mod serve;

pub use config::handle_config_init;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// OpenAI-compatible gateway for Cohere Command R
#[derive(Parser, Debug)]
#[command(
    name = "commandr-proxy",
    version,
    about = "OpenAI-compatible gateway for the Cohere chat API"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway
    Serve(ServeArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "commandr-proxy.toml")]
    pub config: PathBuf,

    /// Override server port
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Override server host
    #[arg(short = 'H', long, env = "PROXY_HOST")]
    pub host: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "PROXY_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Number of requests sent to the backend at the same time
    #[arg(long, env = "PROXY_CONCURRENCY")]
    pub concurrency: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "commandr-proxy.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}
