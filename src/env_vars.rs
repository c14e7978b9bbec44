//! Environment variable names used throughout ipreroute configuration

/// Reroute policy
pub const REDIS_ADDRESS: &str = "REDIS_ADDRESS";
pub const REROUTE_KEY: &str = "REROUTE_KEY";
pub const REROUTE_IP: &str = "REROUTE_IP";
pub const REROUTE_PORT: &str = "REROUTE_PORT";
pub const REROUTE_SCHEME: &str = "REROUTE_SCHEME";

/// Flag lookup behavior
pub const LOOKUP_TIMEOUT_MS: &str = "LOOKUP_TIMEOUT_MS";
pub const LOOKUP_CHECK_TTL: &str = "LOOKUP_CHECK_TTL";
pub const LOOKUP_MAX_IDLE: &str = "LOOKUP_MAX_IDLE";

/// Server limits
pub const MAX_CONNECTIONS: &str = "MAX_CONNECTIONS";

/// Get all environment variable names for documentation/validation
pub fn all_env_vars() -> &'static [&'static str] {
    &[
        REDIS_ADDRESS,
        REROUTE_KEY,
        REROUTE_IP,
        REROUTE_PORT,
        REROUTE_SCHEME,
        LOOKUP_TIMEOUT_MS,
        LOOKUP_CHECK_TTL,
        LOOKUP_MAX_IDLE,
        MAX_CONNECTIONS,
    ]
}
