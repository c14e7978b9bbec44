//! ipreroute - silently reroutes flagged client IPs
//!
//! A standalone HTTP front that looks every client up in a flag store and
//! sends flagged clients to a decoy upstream, without them noticing. All
//! other traffic is forwarded to the local service.
//!
//! # Overview
//!
//! - Client identity from `X-Forwarded-For` or the peer address
//! - Deadline-bounded flag lookup (Redis `EXISTS`, optional TTL check)
//! - Fail open: store errors and timeouts never block traffic
//! - Structured logging with JSON support
//!
//! # Example
//!
//! ```rust,no_run
//! use ipreroute::{EnvVarConfig, config};
//! use ipreroute_core::{Destination, Forwarder, RerouteHandler};
//!
//! # fn main() -> ipreroute_core::Result<()> {
//! let reroute = config::get_reroute_config();
//! println!("Rerouting flagged clients to {}", reroute.server_name());
//!
//! let config = EnvVarConfig::new();
//! let next = Forwarder::new(Destination::plain("127.0.0.1", 9000), config::get_pool_config())?;
//! let handler = RerouteHandler::from_config(&config, next)?;
//! # let _ = handler;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`] - Configuration management from environment variables
//! - [`env_vars`] - Environment variable constants
//! - [`connection`] - Connection limiting and shutdown tracking
//! - [`server`] - Startup banner
//! - [`args`] - Command line argument parsing

#![forbid(unsafe_code)]

pub mod args;
pub mod config;
pub mod connection;
pub mod env_vars;
pub mod server;

// Re-export ipreroute-core modules
pub use ipreroute_core::request_handler;
pub use ipreroute_core::types;

// Re-export commonly used items at crate root
pub use config::{
    EnvVarConfig, get_lookup_config, get_max_connections, get_pool_config, get_reroute_config,
};
pub use ipreroute_core::{
    // Aggregated configuration trait
    ConfigProvider,
    // Composable configuration traits
    ConnectionProvider,
    // Configuration structs
    LookupConfig,
    LookupProvider,
    PoolConfig,
    PoolProvider,
    RerouteConfig,
    RerouteHandler,
    RerouteProvider,
};
