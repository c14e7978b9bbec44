//! Default configuration values for IP Reroute.
//!
//! Shared by the config types, the binary's environment loader and tests.

use std::time::Duration;

/// Default flag store address.
pub const REDIS_ADDRESS: &str = "redis:6379";

/// Default key prefix prepended to the client IP.
pub const REROUTE_KEY: &str = "attacker_ip_";

/// Default reroute destination host.
pub const REROUTE_IP: &str = "127.0.0.1";

/// Default reroute destination port.
pub const REROUTE_PORT: u16 = 443;

/// Default flag store lookup deadline in milliseconds.
pub const LOOKUP_TIMEOUT_MS: u64 = 50;

/// Default flag store lookup deadline.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_millis(LOOKUP_TIMEOUT_MS);

/// Idle flag store connections kept for reuse.
pub const LOOKUP_MAX_IDLE: usize = 16;

/// Dial timeout towards the reroute destination.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP keep-alive probe interval for forwarded connections.
pub const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// Idle forwarded connections are evicted after this long.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Cap on idle forwarded connections across all destinations.
pub const MAX_IDLE_CONNS: usize = 500;

/// Cap on idle forwarded connections per destination.
pub const MAX_IDLE_CONNS_PER_HOST: usize = 200;

/// Default maximum concurrent inbound connections.
pub const MAX_CONNECTIONS: usize = 10_000;
