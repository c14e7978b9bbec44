//! Client identity extraction.
//!
//! Derives the single IP string used to build the flag key:
//! 1. first entry of `x-forwarded-for`, trimmed, taken verbatim
//! 2. otherwise the connection's remote address with its port stripped
//!
//! # Known limitation
//!
//! The port is stripped by splitting the remote address on its first `:`.
//! An IPv6 remote address is therefore truncated (`[::1]:8080` yields `[`).
//! The flag keys written by the external detector rely on this exact
//! derivation, so it is kept as is.
//!
//! # Example
//!
//! ```
//! use hyper::HeaderMap;
//! use ipreroute_core::client_ip::extract_client_ip;
//!
//! let mut headers = HeaderMap::new();
//! headers.insert("x-forwarded-for", "1.2.3.4, 5.6.7.8".parse().unwrap());
//!
//! assert_eq!(extract_client_ip(&headers, "10.0.0.1:4242"), "1.2.3.4");
//! assert_eq!(extract_client_ip(&HeaderMap::new(), "9.9.9.9:51000"), "9.9.9.9");
//! ```

use hyper::HeaderMap;

use crate::headers::X_FORWARDED_FOR;

/// Extracts the client IP from forwarding headers or the remote address.
///
/// No validation is performed: whatever the first `x-forwarded-for` entry
/// holds is returned.
pub fn extract_client_ip(headers: &HeaderMap, remote_addr: &str) -> String {
    if let Some(client) = first_forwarded_for(headers) {
        return client.to_string();
    }

    strip_port(remote_addr).to_string()
}

/// Builds the flag store key for a client IP.
pub fn lookup_key(prefix: &str, client_ip: &str) -> String {
    let mut key = String::with_capacity(prefix.len() + client_ip.len());
    key.push_str(prefix);
    key.push_str(client_ip);
    key
}

/// First comma-separated entry of `x-forwarded-for`, if the header is set
/// and non-empty.
fn first_forwarded_for(headers: &HeaderMap) -> Option<&str> {
    let xff = headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
    if xff.is_empty() {
        return None;
    }

    xff.split(',').next().map(str::trim)
}

/// Everything before the first `:`.
fn strip_port(remote_addr: &str) -> &str {
    match remote_addr.split_once(':') {
        Some((host, _)) => host,
        None => remote_addr,
    }
}
