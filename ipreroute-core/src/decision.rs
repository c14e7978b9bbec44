//! Reroute decision engine.
//!
//! Combines the client identity with a flag store lookup into a binary
//! decision. The engine fails open: only a confirmed flag reroutes, every
//! lookup failure passes the request through.

use hyper::HeaderMap;
use tracing::{debug, warn};

use crate::client_ip::{extract_client_ip, lookup_key};
use crate::error::RerouteError;
use crate::flag_store::{FlagStatus, FlagStore};

/// Outcome for one request. Computed fresh for every request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    /// Client IP the decision was computed for.
    pub client_ip: String,
    /// Whether the request goes to the reroute target.
    pub should_reroute: bool,
}

/// Maps a lookup outcome to a routing choice.
///
/// `NotFlagged` and `LookupFailed` deliberately land on the same side.
pub fn should_reroute(status: &FlagStatus) -> bool {
    match status {
        FlagStatus::Flagged => true,
        FlagStatus::NotFlagged | FlagStatus::LookupFailed(_) => false,
    }
}

/// Decides, per request, between reroute and pass-through.
pub struct DecisionEngine {
    store: FlagStore,
    key_prefix: String,
}

impl DecisionEngine {
    /// Creates an engine looking keys up as `key_prefix + client IP`.
    pub fn new(store: FlagStore, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
        }
    }

    /// Flag store used for lookups.
    pub fn store(&self) -> &FlagStore {
        &self.store
    }

    /// Key prefix.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Decides for a request described by its headers and remote address.
    ///
    /// Never fails. Lookup errors are logged and treated as "not flagged".
    pub async fn decide(&self, headers: &HeaderMap, remote_addr: &str) -> Decision {
        let client_ip = extract_client_ip(headers, remote_addr);
        let key = lookup_key(&self.key_prefix, &client_ip);

        let status = self.store.check(&key).await;
        if let FlagStatus::LookupFailed(err) = &status {
            log_lookup_failure(&client_ip, err);
        }

        Decision {
            should_reroute: should_reroute(&status),
            client_ip,
        }
    }
}

fn log_lookup_failure(client_ip: &str, err: &RerouteError) {
    // A slow store would otherwise flood the logs with one line per request.
    if matches!(err, RerouteError::LookupTimeout(_)) {
        debug!(client_ip = %client_ip, kind = err.kind(), error = %err, "Flag lookup failed, passing through");
    } else {
        warn!(client_ip = %client_ip, kind = err.kind(), error = %err, "Flag lookup failed, passing through");
    }
}
