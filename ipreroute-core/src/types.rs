//! Type definitions for IP Reroute configuration.
//!
//! This module contains:
//! - [`RerouteConfig`], the immutable reroute policy handed over by the host
//! - [`LookupConfig`] and [`PoolConfig`], tuning for the flag store client
//!   and the forwarding transport
//! - composable provider traits and the aggregated [`ConfigProvider`]

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::defaults;

// ============================================================================
// Composable Configuration Traits
// ============================================================================

/// Supplies the reroute policy.
pub trait RerouteProvider: Send + Sync {
    /// Returns the reroute policy.
    fn reroute_config(&self) -> &RerouteConfig;
}

/// Supplies flag store lookup tuning.
pub trait LookupProvider: Send + Sync {
    /// Returns the flag store lookup configuration.
    fn lookup_config(&self) -> &LookupConfig;
}

/// Supplies forwarding transport tuning.
pub trait PoolProvider: Send + Sync {
    /// Returns the forwarding pool configuration.
    fn pool_config(&self) -> &PoolConfig;
}

/// Configuration for connection limits.
pub trait ConnectionProvider: Send + Sync {
    /// Returns the maximum number of concurrent connections (0 = unlimited).
    fn max_connections(&self) -> usize;
}

// ============================================================================
// ConfigProvider - Aggregated trait for full configuration
// ============================================================================

/// Trait for complete configuration injection.
///
/// Combines all specialized configuration traits. Implement the individual
/// traits to provide configuration from any source (environment variables,
/// files, a host framework's JSON record...).
///
/// # Example
///
/// ```
/// use ipreroute_core::{
///     ConnectionProvider, LookupConfig, LookupProvider, PoolConfig, PoolProvider,
///     RerouteConfig, RerouteProvider,
/// };
///
/// struct MyConfig {
///     reroute: RerouteConfig,
///     lookup: LookupConfig,
///     pool: PoolConfig,
/// }
///
/// impl RerouteProvider for MyConfig {
///     fn reroute_config(&self) -> &RerouteConfig { &self.reroute }
/// }
///
/// impl LookupProvider for MyConfig {
///     fn lookup_config(&self) -> &LookupConfig { &self.lookup }
/// }
///
/// impl PoolProvider for MyConfig {
///     fn pool_config(&self) -> &PoolConfig { &self.pool }
/// }
///
/// impl ConnectionProvider for MyConfig {
///     fn max_connections(&self) -> usize { 10_000 }
/// }
/// ```
pub trait ConfigProvider: RerouteProvider + LookupProvider + PoolProvider + ConnectionProvider {}

// Blanket implementation: any type implementing all sub-traits is a ConfigProvider
impl<T> ConfigProvider for T where
    T: RerouteProvider + LookupProvider + PoolProvider + ConnectionProvider
{
}

// ============================================================================
// Reroute policy
// ============================================================================

/// URL scheme used to reach the reroute destination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// TLS origination, certificate chain not validated.
    #[default]
    Https,
    /// Plain HTTP.
    Http,
}

impl Scheme {
    /// Returns the scheme as used in URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Https => "https",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "https" => Ok(Self::Https),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown scheme '{other}'")),
        }
    }
}

/// Reroute policy, loaded once at construction and never mutated.
///
/// Field names follow the host framework's JSON record, and every field
/// falls back to its default when absent. Nothing else is validated.
///
/// # Example
///
/// ```
/// use ipreroute_core::RerouteConfig;
///
/// let config: RerouteConfig = serde_json::from_str(
///     r#"{"redis": "10.1.0.5:6379", "rerouteIP": "10.9.0.1", "reroutePort": "8443"}"#,
/// ).unwrap();
///
/// assert_eq!(config.reroute_key, "attacker_ip_");
/// assert_eq!(config.reroute_port, 8443);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RerouteConfig {
    /// Flag store address (`host:port`).
    #[serde(rename = "redis")]
    pub redis_address: String,
    /// Prefix prepended to the client IP to build the flag key.
    pub reroute_key: String,
    /// Reroute destination host.
    #[serde(rename = "rerouteIP")]
    pub reroute_ip: String,
    /// Reroute destination port, given as a number or a string.
    #[serde(deserialize_with = "deserialize_port")]
    pub reroute_port: u16,
    /// Scheme used towards the reroute destination.
    pub reroute_scheme: Scheme,
}

impl Default for RerouteConfig {
    fn default() -> Self {
        Self {
            redis_address: defaults::REDIS_ADDRESS.to_string(),
            reroute_key: defaults::REROUTE_KEY.to_string(),
            reroute_ip: defaults::REROUTE_IP.to_string(),
            reroute_port: defaults::REROUTE_PORT,
            reroute_scheme: Scheme::default(),
        }
    }
}

impl RerouteConfig {
    /// Server name expected from the reroute destination.
    ///
    /// This is the destination host up to its first `:`, so an accidental
    /// `host:port` value still yields the bare host.
    pub fn server_name(&self) -> &str {
        match self.reroute_ip.split_once(':') {
            Some((host, _)) => host,
            None => &self.reroute_ip,
        }
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

// ============================================================================
// Flag store lookup
// ============================================================================

/// Configuration for the flag store client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupConfig {
    /// Deadline for a whole lookup: connect, write and read.
    pub timeout: Duration,
    /// Also require a positive remaining TTL on the flag key.
    pub check_ttl: bool,
    /// Idle connections kept for reuse (0 = one connection per lookup).
    pub max_idle_connections: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            timeout: defaults::LOOKUP_TIMEOUT,
            check_ttl: true,
            max_idle_connections: defaults::LOOKUP_MAX_IDLE,
        }
    }
}

// ============================================================================
// Forwarding transport
// ============================================================================

/// Connection pool tuning for the forwarding proxy.
///
/// # Example
///
/// ```
/// use ipreroute_core::PoolConfig;
///
/// let pool = PoolConfig::default();
/// assert_eq!(pool.idle_per_destination(), 200);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Timeout for establishing a new connection.
    pub dial_timeout: Duration,
    /// TCP keep-alive probe interval.
    pub tcp_keepalive: Duration,
    /// Idle connections are evicted after this long.
    pub idle_timeout: Duration,
    /// Cap on idle connections overall.
    pub max_idle_conns: usize,
    /// Cap on idle connections to a single destination.
    pub max_idle_conns_per_host: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            dial_timeout: defaults::DIAL_TIMEOUT,
            tcp_keepalive: defaults::TCP_KEEPALIVE,
            idle_timeout: defaults::IDLE_TIMEOUT,
            max_idle_conns: defaults::MAX_IDLE_CONNS,
            max_idle_conns_per_host: defaults::MAX_IDLE_CONNS_PER_HOST,
        }
    }
}

impl PoolConfig {
    /// Effective idle cap for the single destination a forwarder talks to.
    pub fn idle_per_destination(&self) -> usize {
        self.max_idle_conns_per_host.min(self.max_idle_conns)
    }
}
