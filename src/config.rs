//! Configuration management for ipreroute.
//!
//! This module handles loading and caching configuration from environment variables.
//! All configurations are computed once at first access and cached for the lifetime
//! of the application using `once_cell::sync::Lazy`.
//!
//! # Caching
//!
//! Configuration values are read from environment variables only once, at startup.
//! The reroute policy is fixed for the process lifetime: changing an environment
//! variable afterwards has no effect.
//!
//! # Example
//!
//! ```
//! use ipreroute::config;
//!
//! let reroute = config::get_reroute_config();
//! println!("Flag store: {}", reroute.redis_address);
//!
//! let lookup = config::get_lookup_config();
//! println!("Lookup deadline: {:?}", lookup.timeout);
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::warn;

use crate::env_vars;
use ipreroute_core::defaults;
use ipreroute_core::{
    ConnectionProvider, LookupConfig, LookupProvider, PoolConfig, PoolProvider, RerouteConfig,
    RerouteProvider, Scheme,
};

// ============================================================================
// Cached Configuration (computed once at first access)
// ============================================================================

static REROUTE_CONFIG: Lazy<RerouteConfig> =
    Lazy::new(|| compute_reroute_config_internal(|key| env::var(key)));
static LOOKUP_CONFIG: Lazy<LookupConfig> =
    Lazy::new(|| compute_lookup_config_internal(|key| env::var(key)));
static POOL_CONFIG: Lazy<PoolConfig> = Lazy::new(PoolConfig::default);
static MAX_CONNECTIONS: Lazy<usize> = Lazy::new(|| {
    parse_env_var_or_default(
        |key| env::var(key),
        env_vars::MAX_CONNECTIONS,
        defaults::MAX_CONNECTIONS,
    )
});

// ============================================================================
// Internal Helpers
// ============================================================================

/// Reads a string variable, treating blank values as unset.
fn string_env_var_or_default<F>(env_var: &F, var_name: &str, default: &str) -> String
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    match env_var(var_name) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

/// Parses an environment variable with fallback to a default value.
///
/// Logs a warning if the value exists but cannot be parsed.
fn parse_env_var_or_default<F, T>(env_var: F, var_name: &str, default: T) -> T
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr + Copy,
{
    match env_var(var_name) {
        Ok(value) if value.trim().is_empty() => default,
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(var = var_name, value = %value, "Invalid env var value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Parses a boolean flag, accepting `true/false`, `1/0`, `yes/no` and `on/off`.
fn parse_bool_env_var_or_default<F>(env_var: F, var_name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    let Ok(value) = env_var(var_name) else {
        return default;
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "" => default,
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => {
            warn!(var = var_name, value = %value, "Invalid env var value, using default");
            default
        }
    }
}

// ============================================================================
// Public Configuration Getters
// ============================================================================

/// Returns the cached reroute policy.
///
/// Configuration is read from environment variables on first access:
/// - `REDIS_ADDRESS`: Flag store `host:port` (default: `redis:6379`)
/// - `REROUTE_KEY`: Key prefix (default: `attacker_ip_`)
/// - `REROUTE_IP`: Reroute host, also the TLS server name (default: `127.0.0.1`)
/// - `REROUTE_PORT`: Reroute port (default: 443)
/// - `REROUTE_SCHEME`: `https` or `http` (default: `https`)
pub fn get_reroute_config() -> &'static RerouteConfig {
    &REROUTE_CONFIG
}

fn compute_reroute_config_internal<F>(env_var: F) -> RerouteConfig
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    let reroute_port =
        parse_env_var_or_default(&env_var, env_vars::REROUTE_PORT, defaults::REROUTE_PORT);
    let reroute_port = if reroute_port == 0 {
        warn!(var = env_vars::REROUTE_PORT, "Port 0 is not usable, using default");
        defaults::REROUTE_PORT
    } else {
        reroute_port
    };

    RerouteConfig {
        redis_address: string_env_var_or_default(
            &env_var,
            env_vars::REDIS_ADDRESS,
            defaults::REDIS_ADDRESS,
        ),
        reroute_key: string_env_var_or_default(
            &env_var,
            env_vars::REROUTE_KEY,
            defaults::REROUTE_KEY,
        ),
        reroute_ip: string_env_var_or_default(&env_var, env_vars::REROUTE_IP, defaults::REROUTE_IP),
        reroute_port,
        reroute_scheme: parse_env_var_or_default(
            &env_var,
            env_vars::REROUTE_SCHEME,
            Scheme::default(),
        ),
    }
}

/// Returns the cached lookup configuration.
///
/// Configuration is read from environment variables on first access:
/// - `LOOKUP_TIMEOUT_MS`: Lookup deadline in milliseconds (default: 50)
/// - `LOOKUP_CHECK_TTL`: Require a positive TTL (default: true)
/// - `LOOKUP_MAX_IDLE`: Idle flag store connections kept (default: 16)
pub fn get_lookup_config() -> &'static LookupConfig {
    &LOOKUP_CONFIG
}

fn compute_lookup_config_internal<F>(env_var: F) -> LookupConfig
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    let timeout_ms = parse_env_var_or_default(
        &env_var,
        env_vars::LOOKUP_TIMEOUT_MS,
        defaults::LOOKUP_TIMEOUT_MS,
    );
    let timeout_ms = if timeout_ms == 0 {
        warn!(var = env_vars::LOOKUP_TIMEOUT_MS, "Lookup deadline must be positive, using default");
        defaults::LOOKUP_TIMEOUT_MS
    } else {
        timeout_ms
    };

    LookupConfig {
        timeout: Duration::from_millis(timeout_ms),
        check_ttl: parse_bool_env_var_or_default(&env_var, env_vars::LOOKUP_CHECK_TTL, true),
        max_idle_connections: parse_env_var_or_default(
            &env_var,
            env_vars::LOOKUP_MAX_IDLE,
            defaults::LOOKUP_MAX_IDLE,
        ),
    }
}

/// Returns the forwarding pool configuration.
pub fn get_pool_config() -> &'static PoolConfig {
    &POOL_CONFIG
}

/// Returns the cached maximum number of concurrent connections.
///
/// Read from `MAX_CONNECTIONS` (default: 10000, 0 = unlimited).
pub fn get_max_connections() -> usize {
    *MAX_CONNECTIONS
}

// ============================================================================
// EnvVarConfig - ConfigProvider implementation using environment variables
// ============================================================================

/// Configuration provider backed by the cached environment variables.
///
/// # Example
///
/// ```
/// use ipreroute::EnvVarConfig;
/// use ipreroute_core::RerouteProvider;
///
/// let config = EnvVarConfig::new();
/// assert!(!config.reroute_config().reroute_key.is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct EnvVarConfig {
    // Values live in the global lazy statics
    _private: (),
}

impl EnvVarConfig {
    /// Creates a new configuration provider from environment variables.
    ///
    /// This triggers lazy initialization of all configuration values
    /// if they haven't been accessed yet.
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for EnvVarConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RerouteProvider for EnvVarConfig {
    fn reroute_config(&self) -> &RerouteConfig {
        get_reroute_config()
    }
}

impl LookupProvider for EnvVarConfig {
    fn lookup_config(&self) -> &LookupConfig {
        get_lookup_config()
    }
}

impl PoolProvider for EnvVarConfig {
    fn pool_config(&self) -> &PoolConfig {
        get_pool_config()
    }
}

impl ConnectionProvider for EnvVarConfig {
    fn max_connections(&self) -> usize {
        get_max_connections()
    }
}
