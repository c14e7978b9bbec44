//! ipreroute core - silent rerouting of flagged clients
//!
//! This crate provides the building blocks of an HTTP layer that sends
//! requests from flagged client IPs to a fixed decoy destination, and lets
//! everything else through to the next handler:
//! - Client identity extraction (`X-Forwarded-For`, then peer address)
//! - A deadline-bounded flag lookup against a Redis-compatible store
//! - A fail-open reroute decision
//! - A forwarding proxy bound to one fixed destination
//!
//! # Overview
//!
//! Configuration is provided via the [`ConfigProvider`] trait, so the policy
//! can come from environment variables, a JSON record or anything else.
//! The flag store is only ever read; entries are written by an external
//! detector.
//!
//! # Example
//!
//! ```rust,no_run
//! use ipreroute_core::{
//!     ConnectionProvider, Destination, Forwarder, LookupConfig, LookupProvider, PoolConfig,
//!     PoolProvider, RerouteConfig, RerouteHandler, RerouteProvider,
//! };
//!
//! struct MyConfig {
//!     reroute: RerouteConfig,
//!     lookup: LookupConfig,
//!     pool: PoolConfig,
//! }
//!
//! impl RerouteProvider for MyConfig {
//!     fn reroute_config(&self) -> &RerouteConfig { &self.reroute }
//! }
//!
//! impl LookupProvider for MyConfig {
//!     fn lookup_config(&self) -> &LookupConfig { &self.lookup }
//! }
//!
//! impl PoolProvider for MyConfig {
//!     fn pool_config(&self) -> &PoolConfig { &self.pool }
//! }
//!
//! impl ConnectionProvider for MyConfig {
//!     fn max_connections(&self) -> usize { 10_000 }
//! }
//!
//! # fn main() -> ipreroute_core::Result<()> {
//! let config = MyConfig {
//!     reroute: RerouteConfig::default(),
//!     lookup: LookupConfig::default(),
//!     pool: PoolConfig::default(),
//! };
//!
//! // Requests that are not rerouted go to a local service.
//! let next = Forwarder::new(Destination::plain("127.0.0.1", 9000), &config.pool)?;
//! let handler = RerouteHandler::from_config(&config, next)?;
//! # let _ = handler;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`types`] - Configuration types and the [`ConfigProvider`] trait
//! - [`error`] - Error types and result aliases
//! - [`client_ip`] - Client IP extraction and lookup keys
//! - [`resp`] - Minimal RESP codec
//! - [`flag_store`] - Flag store client
//! - [`decision`] - Reroute decision engine
//! - [`forward`] - Forwarding proxy
//! - [`request_handler`] - The reroute layer itself

#![forbid(unsafe_code)]

pub mod body;
pub mod client_ip;
pub mod decision;
pub mod defaults;
pub mod error;
pub mod flag_store;
pub mod forward;
pub mod headers;
pub mod request_handler;
pub mod resp;
#[cfg(test)]
pub mod test_utils;
pub mod types;

// Re-export commonly used items at crate root
pub use body::ProxyBody;
pub use decision::{Decision, DecisionEngine};
pub use error::{RerouteError, Result};
pub use flag_store::{FlagStatus, FlagStore};
pub use forward::{Destination, Forwarder};
pub use request_handler::{NextHandler, RerouteHandler, handle_request};
pub use types::{
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
    RerouteProvider,
    Scheme,
};
