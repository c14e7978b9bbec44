//! Command line argument parsing for ipreroute.
//!
//! This module defines the CLI interface using [`clap`] for argument parsing.
//! The reroute policy itself comes from environment variables (see
//! [`crate::config`]); the CLI only covers the listener and the local
//! pass-through upstream.
//!
//! # Example
//!
//! ```no_run
//! use ipreroute::args::Args;
//! use clap::Parser;
//!
//! let args = Args::parse();
//! if let Err(e) = args.validate() {
//!     eprintln!("Configuration error: {}", e);
//!     std::process::exit(1);
//! }
//! ```

use clap::Parser;

/// Command line arguments for ipreroute.
///
/// # Fields
///
/// * `bind` - Address to bind for listening and forwarding (default: "0.0.0.0")
/// * `listen` - Port to listen on for incoming requests
/// * `forward` - Port of the local service receiving non-rerouted requests
/// * `verbose` - Enable detailed configuration output
/// * `quiet` - Suppress non-essential output (conflicts with verbose)
/// * `json_logs` - Output logs in JSON format for structured logging
#[derive(Parser, Debug)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(
    long_about = "Silently reroutes requests from flagged client IPs to a decoy upstream.\nA client is flagged when `<REROUTE_KEY><client ip>` exists in the flag store.\nEverything else, including requests seen while the store is unreachable,\ngoes to the local service.\n\nExample usage:\n  ipreroute --listen 8080 --forward 9000\n  ipreroute -l 8080 -f 9000 --verbose"
)]
#[command(
    after_help = "Environment variables:\n  REDIS_ADDRESS       Flag store host:port (default: redis:6379)\n  REROUTE_KEY         Flag key prefix (default: attacker_ip_)\n  REROUTE_IP          Reroute host, also the TLS server name (default: 127.0.0.1)\n  REROUTE_PORT        Reroute port (default: 443)\n  REROUTE_SCHEME      https or http (default: https)\n  LOOKUP_TIMEOUT_MS   Flag lookup deadline (default: 50)\n  LOOKUP_CHECK_TTL    Require a positive TTL on flags (default: true)\n  LOOKUP_MAX_IDLE     Idle flag store connections kept (default: 16)\n  MAX_CONNECTIONS     Concurrent connection limit, 0 = unlimited (default: 10000)"
)]
pub struct Args {
    /// Address to bind to (for both listening and forwarding)
    #[arg(
        long,
        short = 'b',
        help = "Bind address for listening and forwarding",
        value_name = "ADDRESS",
        default_value = "0.0.0.0"
    )]
    pub bind: String,

    /// Port to listen on for incoming requests
    #[arg(
        long,
        short = 'l',
        help = "Listen port for incoming connections",
        value_name = "PORT"
    )]
    pub listen: u16,

    /// Port of the local service behind the proxy
    #[arg(
        long,
        short = 'f',
        help = "Destination port for requests that are not rerouted",
        value_name = "PORT"
    )]
    pub forward: u16,

    /// Enable verbose output
    #[arg(
        long,
        short = 'v',
        help = "Show detailed configuration and startup information"
    )]
    pub verbose: bool,

    /// Enable quiet mode (minimal output)
    #[arg(
        long,
        short = 'q',
        help = "Suppress configuration output, show only essential messages",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Output logs in JSON format (for structured logging)
    #[arg(long, help = "Output logs in JSON format for structured logging")]
    pub json_logs: bool,
}

impl Args {
    /// Validates the parsed command line arguments.
    ///
    /// Performs the following validations:
    /// - Listen and forward ports must be different
    /// - Both ports must be greater than 0
    /// - Bind address must be a valid IP address
    ///
    /// # Example
    ///
    /// ```
    /// use ipreroute::args::Args;
    /// use clap::Parser;
    ///
    /// let args = Args::try_parse_from(["ipreroute", "-l", "8080", "-f", "8080"]).unwrap();
    /// assert!(args.validate().is_err());
    ///
    /// let args = Args::try_parse_from(["ipreroute", "-l", "8080", "-f", "9000"]).unwrap();
    /// assert!(args.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), String> {
        if self.listen == self.forward {
            return Err("Listen and forward ports cannot be the same".to_string());
        }

        if self.listen == 0 || self.forward == 0 {
            return Err("Ports must be greater than 0".to_string());
        }

        if self.bind.parse::<std::net::IpAddr>().is_err() {
            return Err(format!("Invalid bind address: '{}'", self.bind));
        }

        Ok(())
    }

    /// The validated bind address.
    pub fn bind_ip(&self) -> Result<std::net::IpAddr, String> {
        self.bind
            .parse()
            .map_err(|_| format!("Invalid bind address: '{}'", self.bind))
    }
}
